// ── Input edge detection ──
//
// Diffs each hardware sample against the previous one and keeps one
// pending flag per direction per input bit. Bits are numbered LSB first
// within each byte: bit `i` lives in byte `i / 8` at position `i % 8`.
//
// A second same-direction edge on one bit before the flags are drained
// collapses into the first; callers drain after every diff.

use strum::Display;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EdgeKind {
    Press,
    Release,
}

/// One transition of one input bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub input: usize,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone)]
pub struct EdgeDetector {
    frame_len: usize,
    previous: Vec<u8>,
    press: Vec<bool>,
    release: Vec<bool>,
}

impl EdgeDetector {
    /// A detector for samples of `frame_len` bytes, all bits released.
    pub fn new(frame_len: usize) -> Self {
        let bits = frame_len * 8;
        Self {
            frame_len,
            previous: vec![0; frame_len],
            press: vec![false; bits],
            release: vec![false; bits],
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Diff one sample against the previous one.
    ///
    /// A sample of the wrong length is rejected whole: no flag and no
    /// stored bit changes.
    pub fn diff(&mut self, sample: &[u8]) -> Result<(), CoreError> {
        if sample.len() != self.frame_len {
            return Err(CoreError::MalformedSample {
                expected: self.frame_len,
                got: sample.len(),
            });
        }

        for (byte_idx, (&now, prev)) in sample.iter().zip(self.previous.iter_mut()).enumerate() {
            let changed = now ^ *prev;
            if changed == 0 {
                continue;
            }
            for bit in 0..8 {
                if changed & (1 << bit) == 0 {
                    continue;
                }
                let input = byte_idx * 8 + bit;
                let pressed = now & (1 << bit) != 0;
                self.press[input] = pressed;
                self.release[input] = !pressed;
            }
            *prev = now;
        }
        Ok(())
    }

    /// Take every pending edge in input order and clear the flags.
    pub fn drain(&mut self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (input, (press, release)) in self
            .press
            .iter_mut()
            .zip(self.release.iter_mut())
            .enumerate()
        {
            if std::mem::take(press) {
                edges.push(Edge {
                    input,
                    kind: EdgeKind::Press,
                });
            } else if std::mem::take(release) {
                edges.push(Edge {
                    input,
                    kind: EdgeKind::Release,
                });
            }
        }
        edges
    }

    /// Pending flags for one input: `(press, release)`.
    pub fn pending(&self, input: usize) -> (bool, bool) {
        (
            self.press.get(input).copied().unwrap_or(false),
            self.release.get(input).copied().unwrap_or(false),
        )
    }

    /// Last accepted sample.
    pub fn previous(&self) -> &[u8] {
        &self.previous
    }

    /// Back to all-released, no pending edges.
    pub fn reset(&mut self) {
        self.previous.fill(0);
        self.press.fill(false);
        self.release.fill(false);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
