//! # Bus Monitor
//!
//! Listens on the link for a set of commands, logs every packet and
//! optionally appends it as one JSON object per line to a daily rolling file.

use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config::MonitorConfig;
use crate::error::{Result, Rs485Error};
use crate::frame::protocol::{command_mask, Packet};
use crate::link::Rs485Link;

/// One observed packet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PacketRecord {
    pub timestamp: DateTime<Utc>,
    pub source_address: u8,
    pub command: u8,
    pub length: u8,
    pub payload: Vec<u8>,
}

impl PacketRecord {
    pub fn new(packet: Packet, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            source_address: packet.source_address,
            command: packet.command,
            length: packet.length(),
            payload: packet.payload,
        }
    }
}

/// JSON-lines sink for packet records
pub struct PacketRecorder<W> {
    writer: W,
    records: u64,
}

impl PacketRecorder<RollingFileAppender> {
    /// Record into `dir/packets.<date>.jsonl`, starting a new file every day
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or written
    pub fn daily(dir: &Path) -> Result<Self> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("packets")
            .filename_suffix("jsonl")
            .build(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(Self::new(appender))
    }
}

impl<W: Write> PacketRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    /// Append one record followed by a newline
    pub fn record(&mut self, record: &PacketRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(io::Error::from)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

type BoxedSink = Box<dyn Write + Send>;

/// Packet monitor bound to one link
pub struct Monitor {
    link: Rs485Link,
    commands: Vec<u8>,
    recorder: Option<PacketRecorder<BoxedSink>>,
    seen: u64,
}

impl Monitor {
    /// Monitor `commands` on `link` without recording
    ///
    /// # Errors
    ///
    /// Returns error if `commands` is empty or holds an id above 31
    pub fn new(link: Rs485Link, commands: Vec<u8>) -> Result<Self> {
        if command_mask(&commands)? == 0 {
            return Err(Rs485Error::EmptySubscription);
        }
        Ok(Self {
            link,
            commands,
            recorder: None,
            seen: 0,
        })
    }

    /// Build a monitor from the `[monitor]` configuration section
    pub fn from_config(link: Rs485Link, config: &MonitorConfig) -> Result<Self> {
        let monitor = Self::new(link, config.commands.clone())?;
        match &config.record_dir {
            Some(dir) => {
                info!("Recording packets to {}", dir.display());
                let recorder = PacketRecorder::daily(dir)?;
                Ok(monitor.with_sink(Box::new(recorder.into_inner())))
            }
            None => Ok(monitor),
        }
    }

    /// Also record every packet to `sink`
    pub fn with_sink(mut self, sink: BoxedSink) -> Self {
        self.recorder = Some(PacketRecorder::new(sink));
        self
    }

    /// Wait for the next packet, log it and record it
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing
    /// that was not already consumed from the link.
    pub async fn next(&mut self) -> Result<PacketRecord> {
        let packet = self.link.read(&self.commands).await?;
        let record = PacketRecord::new(packet, Utc::now());
        self.seen += 1;

        info!(
            "Packet from {} cmd {} ({} bytes): {:02X?}",
            record.source_address, record.command, record.length, record.payload
        );

        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&record)?;
            debug!("Recorded {} packets", recorder.records());
        }

        Ok(record)
    }

    /// Packets observed so far
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn link(&self) -> &Rs485Link {
        &self.link
    }
}
