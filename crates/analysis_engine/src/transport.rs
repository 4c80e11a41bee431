//! MPEG transport stream demuxer strategy.
//!
//! Walks 188-byte packets, groups them by PID and tracks continuity counters.
//! Payloads are not interpreted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use analysis_core::{FormatTag, InfoNode, SourceDescriptor};
use analysis_logging::{analysis_debug, analysis_info, analysis_warn};

use crate::strategy::percent_of;
use crate::{
    AnalysisSettings, BitrateModel, BitrateRecord, PacketModel, PacketRecord, ParseError,
    ParserEvent, ParserStrategy, ProgressSink, RunStatus, StrategyControls,
};

const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const NULL_PID: u16 = 0x1fff;

#[derive(Debug)]
struct PidStats {
    stream: usize,
    packets: u64,
    payload_starts: u64,
    continuity_errors: u64,
    last_counter: Option<u8>,
    window_packets: u32,
}

#[derive(Debug, Default)]
struct DemuxStats {
    file_name: String,
    file_size: u64,
    packets: u64,
    null_packets: u64,
    sync_losses: u64,
    /// Keyed by PID; `stream` numbers follow first appearance.
    pids: BTreeMap<u16, PidStats>,
    /// PID per stream number.
    streams: Vec<u16>,
}

pub struct TransportStreamDemuxer {
    settings: AnalysisSettings,
    controls: StrategyControls,
    stats: Mutex<DemuxStats>,
    packets: Arc<PacketModel>,
    bitrate: Arc<BitrateModel>,
}

impl TransportStreamDemuxer {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self {
            settings,
            controls: StrategyControls::new(),
            stats: Mutex::new(DemuxStats::default()),
            packets: Arc::new(PacketModel::new()),
            bitrate: Arc::new(BitrateModel::new()),
        }
    }

    fn stats(&self) -> MutexGuard<'_, DemuxStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one packet. Returns true when a new stream appeared.
    fn record_packet(&self, packet: &[u8; TS_PACKET_SIZE], offset: u64) -> bool {
        let pid = (u16::from(packet[1] & 0x1f) << 8) | u16::from(packet[2]);
        let payload_start = packet[1] & 0x40 != 0;
        let has_payload = packet[3] & 0x10 != 0;
        let counter = packet[3] & 0x0f;

        let mut stats = self.stats();
        let index = stats.packets;
        stats.packets += 1;
        if pid == NULL_PID {
            stats.null_packets += 1;
            return false;
        }

        let next_stream = stats.streams.len();
        let mut new_stream = false;
        let entry = stats.pids.entry(pid).or_insert_with(|| {
            new_stream = true;
            PidStats {
                stream: next_stream,
                packets: 0,
                payload_starts: 0,
                continuity_errors: 0,
                last_counter: None,
                window_packets: 0,
            }
        });
        entry.packets += 1;
        entry.window_packets += 1;
        if payload_start {
            entry.payload_starts += 1;
        }
        if has_payload {
            if let Some(last) = entry.last_counter {
                // A repeated counter is a legal duplicate packet.
                if counter != (last + 1) & 0x0f && counter != last {
                    entry.continuity_errors += 1;
                }
            }
            entry.last_counter = Some(counter);
        }
        let stream = entry.stream;
        if new_stream {
            stats.streams.push(pid);
        }
        drop(stats);

        self.packets.push(PacketRecord {
            index,
            stream,
            offset,
            size: TS_PACKET_SIZE as u64,
            kind: if payload_start {
                format!("PID {pid} (unit start, cc {counter})")
            } else {
                format!("PID {pid} (cc {counter})")
            },
        });
        new_stream
    }

    /// Emits one bitrate record per stream that carried packets in the window.
    fn flush_bitrate_window(&self, window: u64) {
        let mut stats = self.stats();
        for pid_stats in stats.pids.values_mut() {
            if pid_stats.window_packets == 0 {
                continue;
            }
            self.bitrate.push(BitrateRecord {
                stream: pid_stats.stream,
                window,
                units: pid_stats.window_packets,
                bytes: u64::from(pid_stats.window_packets) * TS_PACKET_SIZE as u64,
            });
            pid_stats.window_packets = 0;
        }
    }

    fn read_error(source: &SourceDescriptor, err: std::io::Error) -> ParseError {
        ParseError::Io {
            path: source.path().to_path_buf(),
            source: err,
        }
    }
}

/// Fills `buf` as far as the reader allows; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn pid_label(pid: u16) -> String {
    match pid {
        0x0000 => "PID 0 (PAT)".to_string(),
        0x0001 => "PID 1 (CAT)".to_string(),
        0x0011 => "PID 17 (SDT)".to_string(),
        0x0012 => "PID 18 (EIT)".to_string(),
        0x0014 => "PID 20 (TDT)".to_string(),
        _ => format!("PID {pid}"),
    }
}

impl ParserStrategy for TransportStreamDemuxer {
    fn name(&self) -> &'static str {
        "transport-stream"
    }

    fn run(
        &self,
        source: &SourceDescriptor,
        sink: &dyn ProgressSink,
    ) -> Result<RunStatus, ParseError> {
        let file = File::open(source.path()).map_err(|err| Self::read_error(source, err))?;
        let file_size = file
            .metadata()
            .map_err(|err| Self::read_error(source, err))?
            .len();
        if file_size == 0 {
            return Err(ParseError::Empty);
        }
        {
            let mut stats = self.stats();
            stats.file_name = source.display_name();
            stats.file_size = file_size;
        }

        let limit = self
            .controls
            .parsing_limit_enabled()
            .then_some(self.settings.packet_limit as u64);
        let window_size = self.settings.bitrate_window.max(1) as u64;
        analysis_info!(
            "demuxing {:?} ({} bytes, limit {:?})",
            source.path(),
            file_size,
            limit
        );

        let capacity = self.settings.read_chunk_size.max(TS_PACKET_SIZE);
        let mut reader = BufReader::with_capacity(capacity, file);
        let mut packet = [0u8; TS_PACKET_SIZE];
        let mut offset = 0u64;
        let mut parsed = 0u64;
        let mut status = RunStatus::Finished;

        loop {
            if self.controls.abort_requested() {
                analysis_debug!("abort observed after packet {}", parsed);
                return Ok(RunStatus::Aborted);
            }
            let read = read_full(&mut reader, &mut packet)
                .map_err(|err| Self::read_error(source, err))?;
            if read < TS_PACKET_SIZE {
                if read > 0 {
                    analysis_debug!("ignoring {} trailing bytes", read);
                }
                break;
            }

            if packet[0] != SYNC_BYTE {
                let Some(skip) = packet.iter().position(|&b| b == SYNC_BYTE) else {
                    offset += TS_PACKET_SIZE as u64;
                    continue;
                };
                if parsed > 0 {
                    self.stats().sync_losses += 1;
                }
                packet.copy_within(skip.., 0);
                let refill = read_full(&mut reader, &mut packet[TS_PACKET_SIZE - skip..])
                    .map_err(|err| Self::read_error(source, err))?;
                offset += skip as u64;
                if refill < skip {
                    break;
                }
            }

            if self.record_packet(&packet, offset) {
                sink.emit(ParserEvent::StreamInfoUpdated);
            }
            parsed += 1;
            offset += TS_PACKET_SIZE as u64;
            if parsed % window_size == 0 {
                self.flush_bitrate_window(parsed / window_size - 1);
            }

            if let Some(limit) = limit {
                if parsed >= limit {
                    analysis_info!("parsing limit of {} packets reached", limit);
                    status = RunStatus::LimitReached;
                    break;
                }
                let progress = percent_of(parsed, limit).max(percent_of(offset, file_size));
                self.controls.advance_progress(progress.min(99), sink);
            } else {
                self.controls
                    .advance_progress(percent_of(offset, file_size).min(99), sink);
            }
        }

        if parsed == 0 {
            analysis_warn!("no transport packets found in {:?}", source.path());
            return Err(ParseError::NoSyncFound {
                format: FormatTag::Container,
            });
        }
        if parsed % window_size != 0 {
            self.flush_bitrate_window(parsed / window_size);
        }
        sink.emit(ParserEvent::StreamInfoUpdated);
        self.controls.advance_progress(100, sink);
        Ok(status)
    }

    fn request_abort(&self) {
        self.controls.request_abort();
    }

    fn set_parsing_limit_enabled(&self, enabled: bool) {
        self.controls.set_parsing_limit_enabled(enabled);
    }

    fn set_stream_filter(&self, stream: Option<usize>) {
        self.controls.set_stream_filter(stream);
        self.packets.set_filter(stream);
        self.bitrate.set_filter(stream);
    }

    fn set_stream_color_coding(&self, enabled: bool) {
        self.controls.set_stream_color_coding(enabled);
        self.packets.set_color_coding(enabled);
        self.bitrate.set_color_coding(enabled);
    }

    fn progress_percent(&self) -> u8 {
        self.controls.progress()
    }

    fn stream_count(&self) -> usize {
        self.stats().streams.len()
    }

    fn stream_summary(&self, stream: usize) -> Option<String> {
        self.stats().streams.get(stream).map(|&pid| pid_label(pid))
    }

    fn stream_info(&self) -> Vec<InfoNode> {
        let stats = self.stats();
        if stats.file_size == 0 {
            return Vec::new();
        }
        let streams = stats
            .streams
            .iter()
            .enumerate()
            .filter_map(|(index, pid)| {
                let pid_stats = stats.pids.get(pid)?;
                Some(InfoNode::branch(
                    format!("Stream {index}"),
                    vec![
                        InfoNode::leaf("PID", pid_label(*pid)),
                        InfoNode::leaf("Packets", pid_stats.packets),
                        InfoNode::leaf("Payload unit starts", pid_stats.payload_starts),
                        InfoNode::leaf("Continuity errors", pid_stats.continuity_errors),
                    ],
                ))
            })
            .collect();
        vec![
            InfoNode::leaf("File", &stats.file_name),
            InfoNode::leaf("File size", format!("{} bytes", stats.file_size)),
            InfoNode::leaf("Packets", stats.packets),
            InfoNode::leaf("Null packets", stats.null_packets),
            InfoNode::leaf("Sync losses", stats.sync_losses),
            InfoNode::branch("Streams", streams),
        ]
    }

    fn packet_model(&self) -> Arc<PacketModel> {
        Arc::clone(&self.packets)
    }

    fn bitrate_model(&self) -> Arc<BitrateModel> {
        Arc::clone(&self.bitrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_full_stops_at_end_of_input() {
        let mut input: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut input, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn well_known_pids_are_named() {
        assert_eq!(pid_label(0), "PID 0 (PAT)");
        assert_eq!(pid_label(256), "PID 256");
    }
}
