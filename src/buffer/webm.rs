//! WebM cluster boundary detection
//!
//! Live WebM output is a header (EBML header, Segment, Info, Tracks)
//! followed by a run of Cluster elements. Each Cluster is an independently
//! uploadable chunk, so the splitter turns an arbitrary byte stream into
//! data pieces separated by boundaries placed right before every Cluster ID.

use bytes::{Bytes, BytesMut};

/// Matroska Cluster element ID
pub const CLUSTER_ID: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];

/// Output of the splitter, in stream order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Bytes belonging to the current chunk
    Data(Bytes),
    /// The current chunk is complete
    Boundary,
}

/// Incremental cluster splitter
#[derive(Debug, Default)]
pub struct ClusterSplitter {
    /// Unemitted bytes; at most `CLUSTER_ID.len() - 1` between calls
    pending: BytesMut,
    /// Whether the current chunk has received any bytes
    chunk_open: bool,
    clusters: u64,
}

impl ClusterSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next bytes of the stream
    pub fn feed(&mut self, data: &[u8]) -> Vec<Piece> {
        self.pending.extend_from_slice(data);
        let mut pieces = Vec::new();

        while let Some(pos) = find_cluster_id(&self.pending) {
            if pos > 0 {
                self.emit(&mut pieces, pos);
            }
            if self.chunk_open {
                pieces.push(Piece::Boundary);
                self.chunk_open = false;
            }
            self.clusters += 1;
            self.emit(&mut pieces, CLUSTER_ID.len());
        }

        // An ID may straddle two reads
        let keep = partial_id_suffix(&self.pending);
        let ready = self.pending.len() - keep;
        if ready > 0 {
            self.emit(&mut pieces, ready);
        }

        pieces
    }

    /// Flush bytes held back at end of stream
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            return None;
        }
        self.chunk_open = true;
        Some(self.pending.split().freeze())
    }

    /// Number of Cluster IDs seen so far
    pub fn clusters(&self) -> u64 {
        self.clusters
    }

    fn emit(&mut self, pieces: &mut Vec<Piece>, len: usize) {
        pieces.push(Piece::Data(self.pending.split_to(len).freeze()));
        self.chunk_open = true;
    }
}

fn find_cluster_id(data: &[u8]) -> Option<usize> {
    data.windows(CLUSTER_ID.len()).position(|w| w == CLUSTER_ID)
}

/// Length of the longest suffix of `data` that is a proper prefix of the ID
fn partial_id_suffix(data: &[u8]) -> usize {
    (1..CLUSTER_ID.len())
        .rev()
        .find(|&k| data.len() >= k && data[data.len() - k..] == CLUSTER_ID[..k])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Collapse pieces into the chunks they describe
    fn chunks(pieces: impl IntoIterator<Item = Piece>) -> Vec<Vec<u8>> {
        let mut out = vec![Vec::new()];
        for piece in pieces {
            match piece {
                Piece::Data(data) => out.last_mut().unwrap().extend_from_slice(&data),
                Piece::Boundary => out.push(Vec::new()),
            }
        }
        out
    }

    fn sample_stream() -> Vec<u8> {
        let mut stream = vec![0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x02];
        stream.extend_from_slice(&CLUSTER_ID);
        stream.extend_from_slice(&[0x10, 0x11, 0x12]);
        stream.extend_from_slice(&CLUSTER_ID);
        stream.extend_from_slice(&[0x20, 0x21]);
        stream
    }

    #[test]
    fn test_split_in_one_read() {
        let mut splitter = ClusterSplitter::new();
        let mut pieces = splitter.feed(&sample_stream());
        pieces.extend(splitter.finish().map(Piece::Data));

        let chunks = chunks(pieces);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], vec![0x1A, 0x45, 0xDF, 0xA3, 0x01, 0x02]);
        assert_eq!(&chunks[1][..4], &CLUSTER_ID);
        assert_eq!(&chunks[1][4..], &[0x10, 0x11, 0x12]);
        assert_eq!(&chunks[2][4..], &[0x20, 0x21]);
        assert_eq!(splitter.clusters(), 2);
    }

    #[test]
    fn test_split_byte_by_byte() {
        let stream = sample_stream();
        let mut splitter = ClusterSplitter::new();
        let mut pieces = Vec::new();
        for byte in &stream {
            pieces.extend(splitter.feed(std::slice::from_ref(byte)));
        }
        pieces.extend(splitter.finish().map(Piece::Data));

        let mut whole = ClusterSplitter::new();
        let mut expected = whole.feed(&stream);
        expected.extend(whole.finish().map(Piece::Data));

        assert_eq!(chunks(pieces), chunks(expected));
    }

    #[test]
    fn test_stream_starting_with_cluster() {
        let mut splitter = ClusterSplitter::new();
        let pieces = splitter.feed(&CLUSTER_ID);
        assert!(!pieces.contains(&Piece::Boundary));
    }

    #[test]
    fn test_holds_back_partial_id() {
        let mut splitter = ClusterSplitter::new();
        let pieces = splitter.feed(&[0x00, 0x1F, 0x43]);
        assert_eq!(pieces, vec![Piece::Data(Bytes::from_static(&[0x00]))]);

        let pieces = splitter.feed(&[0xB6, 0x75]);
        assert_eq!(
            pieces,
            vec![Piece::Boundary, Piece::Data(Bytes::from_static(&CLUSTER_ID))]
        );
    }

    #[test]
    fn test_partial_suffix() {
        assert_eq!(partial_id_suffix(&[]), 0);
        assert_eq!(partial_id_suffix(&[0x1F]), 1);
        assert_eq!(partial_id_suffix(&[0x00, 0x1F, 0x43, 0xB6]), 3);
        assert_eq!(partial_id_suffix(&[0x1F, 0x44]), 0);
    }
}
