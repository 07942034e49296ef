pub mod buffer;
pub mod classify;
pub mod demux;

use classify::ClassifiedLine;

/// Demultiplexes a raw log buffer and classifies every line it yields.
pub fn decode(buf: &[u8]) -> Vec<ClassifiedLine> {
    demux::demux(buf).map(|line| classify::classify(&line)).collect()
}
