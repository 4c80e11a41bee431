//! Annex-B byte stream strategy.
//!
//! Splits the stream at `00 00 01` start codes and labels every unit from
//! its header byte(s). Nothing beyond the unit header is interpreted.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::sync::{Arc, Mutex, PoisonError};

use analysis_core::{FormatTag, InfoNode, SourceDescriptor};
use analysis_logging::{analysis_debug, analysis_info};

use crate::strategy::percent_of;
use crate::{
    AnalysisSettings, BitrateModel, BitrateRecord, PacketModel, PacketRecord, ParseError,
    ParserEvent, ParserStrategy, ProgressSink, RunStatus, StrategyControls,
};

/// Header layout of the supported Annex-B codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalCodec {
    Hevc,
    Vvc,
    Avc,
    Mpeg2,
}

impl NalCodec {
    pub fn format(self) -> FormatTag {
        match self {
            NalCodec::Hevc => FormatTag::AnnexBHevc,
            NalCodec::Vvc => FormatTag::AnnexBVvc,
            NalCodec::Avc => FormatTag::AnnexBAvc,
            NalCodec::Mpeg2 => FormatTag::AnnexBMpeg2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NalCodec::Hevc => "HEVC",
            NalCodec::Vvc => "VVC",
            NalCodec::Avc => "AVC",
            NalCodec::Mpeg2 => "MPEG-2",
        }
    }

    fn header_len(self) -> usize {
        match self {
            NalCodec::Hevc | NalCodec::Vvc => 2,
            NalCodec::Avc | NalCodec::Mpeg2 => 1,
        }
    }

    /// Names the unit from the bytes following its start code.
    pub fn unit_kind(self, header: &[u8]) -> &'static str {
        if header.len() < self.header_len() {
            return "Truncated unit";
        }
        match self {
            NalCodec::Hevc => match (header[0] >> 1) & 0x3f {
                0..=9 => "Non-IRAP slice",
                16..=18 => "BLA slice",
                19 | 20 => "IDR slice",
                21 => "CRA slice",
                32 => "VPS",
                33 => "SPS",
                34 => "PPS",
                35 => "Access unit delimiter",
                36 => "End of sequence",
                37 => "End of bitstream",
                38 => "Filler data",
                39 => "Prefix SEI",
                40 => "Suffix SEI",
                _ => "Reserved",
            },
            NalCodec::Vvc => match (header[1] >> 3) & 0x1f {
                0..=3 => "Non-IRAP slice",
                7 | 8 => "IDR slice",
                9 => "CRA slice",
                10 => "GDR slice",
                12 => "OPI",
                13 => "DCI",
                14 => "VPS",
                15 => "SPS",
                16 => "PPS",
                17 | 18 => "APS",
                19 => "Picture header",
                20 => "Access unit delimiter",
                21 => "End of sequence",
                22 => "End of bitstream",
                23 => "Prefix SEI",
                24 => "Suffix SEI",
                25 => "Filler data",
                _ => "Reserved",
            },
            NalCodec::Avc => match header[0] & 0x1f {
                1 => "Non-IDR slice",
                2..=4 => "Slice data partition",
                5 => "IDR slice",
                6 => "SEI",
                7 => "SPS",
                8 => "PPS",
                9 => "Access unit delimiter",
                10 => "End of sequence",
                11 => "End of stream",
                12 => "Filler data",
                _ => "Reserved",
            },
            NalCodec::Mpeg2 => match header[0] {
                0x00 => "Picture",
                0x01..=0xaf => "Slice",
                0xb2 => "User data",
                0xb3 => "Sequence header",
                0xb5 => "Extension",
                0xb7 => "Sequence end",
                0xb8 => "Group of pictures",
                _ => "System",
            },
        }
    }
}

#[derive(Debug, Default)]
struct UnitStats {
    file_name: String,
    file_size: u64,
    units: u64,
    bytes: u64,
    by_kind: BTreeMap<&'static str, u64>,
}

/// Annex-B strategy for one codec.
pub struct AnnexBParser {
    codec: NalCodec,
    settings: AnalysisSettings,
    controls: StrategyControls,
    stats: Mutex<UnitStats>,
    packets: Arc<PacketModel>,
    bitrate: Arc<BitrateModel>,
}

impl AnnexBParser {
    pub fn new(codec: NalCodec, settings: AnalysisSettings) -> Self {
        Self {
            codec,
            settings,
            controls: StrategyControls::new(),
            stats: Mutex::new(UnitStats::default()),
            packets: Arc::new(PacketModel::new()),
            bitrate: Arc::new(BitrateModel::new()),
        }
    }

    pub fn codec(&self) -> NalCodec {
        self.codec
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, UnitStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_error(source: &SourceDescriptor, err: std::io::Error) -> ParseError {
        ParseError::Io {
            path: source.path().to_path_buf(),
            source: err,
        }
    }
}

impl ParserStrategy for AnnexBParser {
    fn name(&self) -> &'static str {
        match self.codec {
            NalCodec::Hevc => "annexb-hevc",
            NalCodec::Vvc => "annexb-vvc",
            NalCodec::Avc => "annexb-avc",
            NalCodec::Mpeg2 => "annexb-mpeg2",
        }
    }

    fn run(
        &self,
        source: &SourceDescriptor,
        sink: &dyn ProgressSink,
    ) -> Result<RunStatus, ParseError> {
        let mut file = File::open(source.path()).map_err(|err| Self::read_error(source, err))?;
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
            .then_some(self.settings.unit_limit);
        analysis_info!(
            "{} parsing {:?} ({} bytes, limit {:?})",
            self.codec.label(),
            source.path(),
            file_size,
            limit
        );

        let mut scan = UnitScan {
            parser: self,
            sink,
            file_size,
            limit,
            open: None,
            zero_run: 0,
            window: BitrateWindow::new(self.settings.bitrate_window),
        };
        let mut buf = vec![0u8; self.settings.read_chunk_size.max(16)];
        let mut position = 0u64;
        loop {
            if self.controls.abort_requested() {
                return Ok(RunStatus::Aborted);
            }
            let read = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(Self::read_error(source, err)),
            };
            if let Some(status) = scan.feed(&buf[..read], position) {
                return Ok(status);
            }
            position += read as u64;
        }
        scan.finish(position)
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
        usize::from(self.stats().units > 0)
    }

    fn stream_summary(&self, stream: usize) -> Option<String> {
        (stream < self.stream_count()).then(|| format!("{} video", self.codec.format()))
    }

    fn stream_info(&self) -> Vec<InfoNode> {
        let stats = self.stats();
        if stats.file_size == 0 {
            return Vec::new();
        }
        let kinds = stats
            .by_kind
            .iter()
            .map(|(kind, count)| InfoNode::leaf(*kind, count))
            .collect();
        vec![
            InfoNode::leaf("File", &stats.file_name),
            InfoNode::leaf("File size", format!("{} bytes", stats.file_size)),
            InfoNode::branch(
                "Stream 0",
                vec![
                    InfoNode::leaf("Codec", self.codec.label()),
                    InfoNode::leaf("Units", stats.units),
                    InfoNode::leaf("Bytes", stats.bytes),
                    InfoNode::branch("Unit types", kinds),
                ],
            ),
        ]
    }

    fn packet_model(&self) -> Arc<PacketModel> {
        Arc::clone(&self.packets)
    }

    fn bitrate_model(&self) -> Arc<BitrateModel> {
        Arc::clone(&self.bitrate)
    }
}

struct OpenUnit {
    offset: u64,
    header: [u8; 2],
    header_len: usize,
}

/// Accumulates units into fixed-size bitrate windows.
pub(crate) struct BitrateWindow {
    size: usize,
    index: u64,
    units: u32,
    bytes: u64,
}

impl BitrateWindow {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size: size.max(1),
            index: 0,
            units: 0,
            bytes: 0,
        }
    }

    pub(crate) fn add(&mut self, stream: usize, bytes: u64) -> Option<BitrateRecord> {
        self.units += 1;
        self.bytes += bytes;
        if self.units as usize >= self.size {
            self.flush(stream)
        } else {
            None
        }
    }

    pub(crate) fn flush(&mut self, stream: usize) -> Option<BitrateRecord> {
        if self.units == 0 {
            return None;
        }
        let record = BitrateRecord {
            stream,
            window: self.index,
            units: self.units,
            bytes: self.bytes,
        };
        self.index += 1;
        self.units = 0;
        self.bytes = 0;
        Some(record)
    }
}

struct UnitScan<'a> {
    parser: &'a AnnexBParser,
    sink: &'a dyn ProgressSink,
    file_size: u64,
    limit: Option<usize>,
    open: Option<OpenUnit>,
    zero_run: usize,
    window: BitrateWindow,
}

impl UnitScan<'_> {
    /// Scans one chunk starting at absolute `offset`. Returns a status when
    /// the run must end early.
    fn feed(&mut self, chunk: &[u8], offset: u64) -> Option<RunStatus> {
        let header_len = self.parser.codec.header_len();
        for (i, &byte) in chunk.iter().enumerate() {
            let position = offset + i as u64;
            if byte == 0x01 && self.zero_run >= 2 {
                // A four-byte start code keeps its leading zero; longer runs
                // are trailing zeros of the previous unit.
                let start = position - self.zero_run.min(3) as u64;
                self.zero_run = 0;
                if let Some(unit) = self.open.take() {
                    if let Some(status) = self.close_unit(unit, start) {
                        return Some(status);
                    }
                }
                self.open = Some(OpenUnit {
                    offset: start,
                    header: [0; 2],
                    header_len: 0,
                });
                continue;
            }
            if let Some(unit) = self.open.as_mut() {
                if unit.header_len < header_len {
                    unit.header[unit.header_len] = byte;
                    unit.header_len += 1;
                }
            }
            self.zero_run = if byte == 0 { self.zero_run + 1 } else { 0 };
        }
        None
    }

    /// Records a finished unit. This is the cancellation safe point.
    fn close_unit(&mut self, unit: OpenUnit, end: u64) -> Option<RunStatus> {
        let parser = self.parser;
        let size = end - unit.offset;
        let kind = parser.codec.unit_kind(&unit.header[..unit.header_len]);

        let (units, first_of_kind) = {
            let mut guard = parser.stats();
            let stats = &mut *guard;
            stats.units += 1;
            stats.bytes += size;
            let count = stats.by_kind.entry(kind).or_insert(0);
            *count += 1;
            (stats.units, *count == 1)
        };
        parser.packets.push(PacketRecord {
            index: units - 1,
            stream: 0,
            offset: unit.offset,
            size,
            kind: kind.to_string(),
        });
        if let Some(record) = self.window.add(0, size) {
            parser.bitrate.push(record);
        }
        if first_of_kind {
            self.sink.emit(ParserEvent::StreamInfoUpdated);
        }

        if parser.controls.abort_requested() {
            analysis_debug!("abort observed after unit {}", units);
            return Some(RunStatus::Aborted);
        }
        if let Some(limit) = self.limit {
            if units >= limit as u64 {
                analysis_info!("parsing limit of {} units reached", limit);
                self.complete();
                return Some(RunStatus::LimitReached);
            }
            let by_units = percent_of(units, limit as u64);
            let by_bytes = percent_of(end, self.file_size);
            parser
                .controls
                .advance_progress(by_units.max(by_bytes).min(99), self.sink);
        } else {
            parser
                .controls
                .advance_progress(percent_of(end, self.file_size).min(99), self.sink);
        }
        None
    }

    fn finish(mut self, end: u64) -> Result<RunStatus, ParseError> {
        let Some(unit) = self.open.take() else {
            return Err(ParseError::NoSyncFound {
                format: self.parser.codec.format(),
            });
        };
        if let Some(status) = self.close_unit(unit, end) {
            return Ok(status);
        }
        self.complete();
        Ok(RunStatus::Finished)
    }

    fn complete(&mut self) {
        if let Some(record) = self.window.flush(0) {
            self.parser.bitrate.push(record);
        }
        self.sink.emit(ParserEvent::StreamInfoUpdated);
        self.parser.controls.advance_progress(100, self.sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_unit_headers_per_codec() {
        assert_eq!(NalCodec::Hevc.unit_kind(&[0x40, 0x01]), "VPS");
        assert_eq!(NalCodec::Hevc.unit_kind(&[0x26, 0x01]), "IDR slice");
        assert_eq!(NalCodec::Avc.unit_kind(&[0x67]), "SPS");
        assert_eq!(NalCodec::Avc.unit_kind(&[0x65]), "IDR slice");
        assert_eq!(NalCodec::Vvc.unit_kind(&[0x00, 0x79]), "SPS");
        assert_eq!(NalCodec::Mpeg2.unit_kind(&[0xb3]), "Sequence header");
        assert_eq!(NalCodec::Hevc.unit_kind(&[0x40]), "Truncated unit");
    }

    #[test]
    fn bitrate_window_flushes_when_full() {
        let mut window = BitrateWindow::new(2);
        assert_eq!(window.add(0, 10), None);
        let record = window.add(0, 5).unwrap();
        assert_eq!((record.window, record.units, record.bytes), (0, 2, 15));
        assert_eq!(window.flush(0), None);
        window.add(0, 7);
        assert_eq!(window.flush(0).unwrap().window, 1);
    }
}
