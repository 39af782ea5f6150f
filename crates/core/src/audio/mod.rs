/// Re-chunks interleaved host audio into fixed-size mono blocks.
///
/// Hosts do not always honour the requested buffer size, so samples are
/// accumulated across callbacks and a block is emitted every time
/// `block_size` first-channel samples are available. The internal buffer is
/// allocated once.
#[derive(Debug, Clone)]
pub struct BlockAssembler {
    block_size: usize,
    channels: usize,
    channel_cursor: usize,
    pending: Vec<f32>,
}

impl BlockAssembler {
    pub fn new(block_size: usize, channels: usize) -> Self {
        Self {
            block_size,
            channels: channels.max(1),
            channel_cursor: 0,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples buffered towards the next block.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feeds interleaved samples, invoking `on_block` for each completed
    /// block of the first channel.
    pub fn push_interleaved<I, F>(&mut self, samples: I, mut on_block: F)
    where
        I: IntoIterator<Item = f32>,
        F: FnMut(&[f32]),
    {
        if self.block_size == 0 {
            return;
        }

        for sample in samples {
            let channel = self.channel_cursor;
            self.channel_cursor = (self.channel_cursor + 1) % self.channels;
            if channel != 0 {
                continue;
            }

            self.pending.push(sample);
            if self.pending.len() == self.block_size {
                on_block(&self.pending);
                self.pending.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_fixed_blocks_across_callbacks() {
        let mut assembler = BlockAssembler::new(4, 1);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        assembler.push_interleaved([1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push_interleaved([4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b| blocks.push(b.to_vec()));
        assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn keeps_first_channel_even_when_frames_split() {
        let mut assembler = BlockAssembler::new(3, 2);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        // Frames (L, R): (1, -1) (2, -2) (3, -3), split mid-frame.
        assembler.push_interleaved([1.0, -1.0, 2.0], |b| blocks.push(b.to_vec()));
        assembler.push_interleaved([-2.0, 3.0, -3.0], |b| blocks.push(b.to_vec()));
        assert_eq!(blocks, vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn zero_channels_is_treated_as_mono() {
        let assembler = BlockAssembler::new(8, 0);
        assert_eq!(assembler.channels(), 1);
    }
}
