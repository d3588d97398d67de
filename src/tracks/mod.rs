mod parser;
mod storage;

pub use parser::{
    ElevationSummary, GpxParser, ParseError, Track, TrackParser, TrackPoint, parse_gpx,
};
pub use storage::{
    StorageError, TRACK_EXTENSION, TrackStorage, has_track_extension, validate_name,
};
