// SPDX-License-Identifier: GPL-2.0-or-later

use bytes::{Bytes, BytesMut};

// Accumulates chunks until probing can identify the container.
#[derive(Default)]
pub(crate) struct ChunkCache {
    buffers: Vec<Bytes>,
    data_length: usize,
}

impl ChunkCache {
    pub(crate) fn append(&mut self, data: Bytes) {
        self.data_length += data.len();
        self.buffers.push(data);
    }

    pub(crate) fn data_length(&self) -> usize {
        self.data_length
    }

    // Concatenation of all appended chunks in arrival order.
    // Empties the cache.
    pub(crate) fn flush(&mut self) -> Bytes {
        if self.buffers.len() == 1 {
            self.data_length = 0;
            return self.buffers.remove(0);
        }

        let mut joined = BytesMut::with_capacity(self.data_length);
        for buffer in self.buffers.drain(..) {
            joined.extend_from_slice(&buffer);
        }
        self.data_length = 0;
        joined.freeze()
    }

    pub(crate) fn reset(&mut self) {
        self.buffers.clear();
        self.data_length = 0;
    }
}
