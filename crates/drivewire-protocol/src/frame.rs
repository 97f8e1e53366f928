//! Negotiation frame codec.
//!
//! The polling form of the endpoint returns a buffer holding one or more
//! length-prefixed segments:
//!
//! ```text
//! ... 0x00 <digit bytes> 0xFF <length bytes of UTF-8 text> ...
//! ```
//!
//! Bytes before the zero delimiter are skipped, the digit bytes each carry a
//! decimal digit *value* (not ASCII) accumulated into the segment length, a
//! run of 0xFF sentinels is skipped, and the segment text follows. The first
//! character of the text is a single digit naming the frame type; the rest
//! is the payload. Running past the end of the buffer ends decoding —
//! truncation is normal termination, not a fault.

const DELIMITER: u8 = 0;
const SENTINEL: u8 = 255;

/// Frame type digit carried as the first character of each segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl FrameType {
    /// Map a frame-type character (`'0'..='6'`) to its variant.
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Open),
            '1' => Some(Self::Close),
            '2' => Some(Self::Ping),
            '3' => Some(Self::Pong),
            '4' => Some(Self::Message),
            '5' => Some(Self::Upgrade),
            '6' => Some(Self::Noop),
            _ => None,
        }
    }
}

/// One decoded segment from a negotiation buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: String,
}

/// Decode a negotiation buffer into its frames.
///
/// The returned iterator borrows the buffer and re-parses from the start on
/// every fresh call; decoding holds no state beyond the cursor.
pub fn decode_frames(buffer: &[u8]) -> Frames<'_> {
    Frames { buffer, index: 0 }
}

/// Iterator over the frames of a negotiation buffer.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    buffer: &'a [u8],
    index: usize,
}

impl Frames<'_> {
    fn byte(&self, index: usize) -> Option<u8> {
        self.buffer.get(index).copied()
    }

    /// Advance past the delimiter and read the digit-value length bytes.
    fn read_length(&mut self) -> Option<usize> {
        while self.byte(self.index)? != DELIMITER {
            self.index += 1;
        }
        self.index += 1;

        let mut length: usize = 0;
        loop {
            let byte = self.byte(self.index)?;
            if byte == SENTINEL {
                break;
            }
            length = length.checked_mul(10)?.checked_add(usize::from(byte))?;
            self.index += 1;
        }
        Some(length)
    }

    fn read_text(&mut self, length: usize) -> Option<&[u8]> {
        while self.byte(self.index)? == SENTINEL {
            self.index += 1;
        }
        let end = self.index.checked_add(length)?;
        let text = self.buffer.get(self.index..end)?;
        self.index = end;
        Some(text)
    }
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let length = self.read_length()?;
        let text = self.read_text(length)?;
        let text = std::str::from_utf8(text).ok()?;

        let mut chars = text.chars();
        let frame_type = FrameType::from_digit(chars.next()?)?;
        Some(Frame {
            frame_type,
            payload: chars.as_str().to_string(),
        })
    }
}
