use analysis_core::FormatTag;

use crate::{AnalysisSettings, AnnexBParser, NalCodec, ParserStrategy, TransportStreamDemuxer};

/// Produces a fresh, idle parser strategy for a format.
pub trait StrategySelector {
    /// `None` means no parser exists for `format`; this is not an error.
    fn select(&self, format: FormatTag) -> Option<Box<dyn ParserStrategy>>;
}

/// Maps every [`FormatTag`] to one of the built-in strategies.
///
/// Constructing a strategy allocates its models but never starts work.
pub fn select_strategy(
    format: FormatTag,
    settings: &AnalysisSettings,
) -> Option<Box<dyn ParserStrategy>> {
    let annex_b = |codec| -> Box<dyn ParserStrategy> {
        Box::new(AnnexBParser::new(codec, settings.clone()))
    };
    match format {
        FormatTag::AnnexBHevc => Some(annex_b(NalCodec::Hevc)),
        FormatTag::AnnexBVvc => Some(annex_b(NalCodec::Vvc)),
        FormatTag::AnnexBAvc => Some(annex_b(NalCodec::Avc)),
        FormatTag::AnnexBMpeg2 => Some(annex_b(NalCodec::Mpeg2)),
        FormatTag::Container => Some(Box::new(TransportStreamDemuxer::new(settings.clone()))),
        FormatTag::Unknown => None,
    }
}

/// Default selector backed by [`select_strategy`].
#[derive(Debug, Clone, Default)]
pub struct FormatSelector {
    settings: AnalysisSettings,
}

impl FormatSelector {
    pub fn new(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }
}

impl StrategySelector for FormatSelector {
    fn select(&self, format: FormatTag) -> Option<Box<dyn ParserStrategy>> {
        select_strategy(format, &self.settings)
    }
}
