use bytes::BytesMut;
use flate2::{Compress, Compression, FlushCompress, Status};

fn calculate_buffer_size(payload_size: usize) -> usize {
    if payload_size <= 4096 {
        4096
    } else if payload_size <= 65536 {
        16384
    } else {
        65536
    }
}

const DEFLATE_TRAILER: [u8; 4] = [0, 0, 255, 255];

pub(crate) struct Encoder {
    compressor: Compress,
    reset_context: bool,
}

impl Encoder {
    /// Creates a new encoder with a default compression level and window size (15 bits).
    pub fn new(reset_context: bool, window_bits: Option<u8>) -> Self {
        let compressor = match window_bits {
            Some(bits) => Compress::new_with_window_bits(Compression::default(), false, bits),
            None => Compress::new(Compression::default(), false),
        };
        Self {
            compressor,
            reset_context,
        }
    }

    /// Compresses `payload` with raw deflate and strips the trailing
    /// empty-block marker, per RFC 7692 section 7.2.1.
    pub fn compress(&mut self, payload: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        if self.reset_context {
            self.compressor.reset();
        }

        let buffer_size = calculate_buffer_size(payload.len());
        let mut compressed_data = BytesMut::with_capacity(buffer_size);
        let mut buffer = vec![0; buffer_size];

        let before_in = self.compressor.total_in();
        let before_out = self.compressor.total_out();

        loop {
            let consumed = (self.compressor.total_in() - before_in) as usize;
            let input = &payload[consumed..];

            let status = self
                .compressor
                .compress(input, &mut buffer, FlushCompress::Sync)?;

            let produced = (self.compressor.total_out() - before_out) as usize;
            compressed_data.extend_from_slice(&buffer[..produced - compressed_data.len()]);

            match status {
                Status::StreamEnd => break,
                _ if (self.compressor.total_in() - before_in) as usize >= payload.len() => break,
                _ => continue,
            }
        }

        if compressed_data.ends_with(&DEFLATE_TRAILER) {
            let new_len = compressed_data.len() - DEFLATE_TRAILER.len();
            compressed_data.truncate(new_len);
        }

        Ok(compressed_data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;

    #[test]
    fn compress_then_decompress_round_trips() {
        let mut encoder = Encoder::new(false, None);
        let mut decoder = Decoder::new(false, None);

        let original = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = encoder.compress(&original).unwrap();
        assert!(compressed.len() < original.len());

        let mut payload = BytesMut::from(&compressed[..]);
        let decompressed = decoder.decompress(&mut payload).unwrap();
        assert_eq!(decompressed, original);
    }
}
