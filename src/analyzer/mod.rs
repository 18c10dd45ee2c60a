pub mod ffprobe;
pub mod metadata;

use std::future::Future;
use std::path::Path;

pub use ffprobe::FfprobeProber;
pub use metadata::{ChapterProbe, CodecType, FormatProbe, ProbeResult, StreamProbe};

use crate::error::ProbeError;

/// Source of probe results for a media file
pub trait Prober: Send + Sync {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeResult, ProbeError>> + Send;
}
