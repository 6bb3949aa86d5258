//! Exact nearest-neighbor index over embedding vectors (squared Euclidean distance).
//!
//! Vectors live in one row-major buffer; a vector's row is its position, which is also
//! the position of its chunk in the metadata. Search compares the query against every
//! row, so recall is exact. Built fresh on every rebuild; rows are only ever appended.

use std::cmp::Ordering;

const MAGIC: &[u8; 4] = b"RAGV";
const FORMAT_VERSION: u32 = 2;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + DIGEST_LEN;

/// Length of the companion digest stored in the header.
pub const DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

/// One search hit: the row position and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl VectorIndex {
    /// Empty index for vectors of `dimension`.
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            data: Vec::new(),
        })
    }

    /// Index `vectors` in order. The first vector fixes the dimension.
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let first = vectors.first().ok_or(IndexError::Empty)?;
        let mut index = Self::new(first.len())?;
        index.data.reserve(vectors.len() * index.dimension);
        for vector in vectors {
            index.add(vector)?;
        }
        Ok(index)
    }

    /// Append one vector; it gets the next position.
    pub fn add(&mut self, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// The `k` nearest vectors, nearest first (ties by position). Returns `min(k, len)`
    /// hits; every position is in `0..len`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();
        let by_distance = |a: &Neighbor, b: &Neighbor| -> Ordering {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        };
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, by_distance);
            hits.truncate(k);
        }
        hits.sort_unstable_by(by_distance);
        Ok(hits)
    }

    /// Binary form: magic, format version, dimension, count, `companion` digest, then
    /// little-endian rows. `companion` identifies the file this one was written with.
    pub fn to_bytes(&self, companion: &[u8; DIGEST_LEN]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + std::mem::size_of_val(&self.data[..]));
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(companion);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decodes [`VectorIndex::to_bytes`] output, returning the index and its companion digest.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, [u8; DIGEST_LEN]), IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt("file shorter than header".to_string()));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let mut count = [0u8; 8];
        count.copy_from_slice(&header[12..20]);
        let count = usize::try_from(u64::from_le_bytes(count))
            .map_err(|_| IndexError::Corrupt("vector count overflows".to_string()))?;
        let mut companion = [0u8; DIGEST_LEN];
        companion.copy_from_slice(&header[20..HEADER_LEN]);

        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| IndexError::Corrupt("vector data size overflows".to_string()))?;
        if body.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {expected} bytes of vector data, found {}",
                body.len()
            )));
        }
        let mut index = Self::new(dimension)?;
        index.data = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok((index, companion))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("nothing to index")]
    Empty,
    #[error("vector dimension must be positive")]
    ZeroDimension,
    #[error("invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("corrupt index file: {0}")]
    Corrupt(String),
}
