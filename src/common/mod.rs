pub mod errors;

use std::time::Duration;

pub const VALID_IMAGE_EXTENSIONS: &'static [&'static str] = &["jpg", "jpeg", "png"];

/// Suffix stamped onto every output filename; also used to recognize (and
/// refuse to reprocess) our own output if it lands back in a watched folder.
pub const PROCESSED_MARKER: &str = "_processed";

pub const OUTPUT_EXTENSION: &str = "jpg";

pub const JPEG_QUALITY: u8 = 90;

/// A creation event can fire while the writer is still streaming bytes, so a
/// fresh file is only handed to the compositor once its size stops moving.
pub const SIZE_PROBE_INTERVAL: Duration = Duration::from_millis(150);

pub const SIZE_PROBE_ATTEMPTS: usize = 20;

pub const DECODE_RETRY_LIMIT: usize = 3;

pub const DECODE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Camera-import tools often create a file and then rename it into place,
/// firing two arrival events for one physical file. Events for a path seen
/// within this window are treated as duplicates.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5);

/// How often the watch loop wakes up to check the cancellation token.
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(250);
