//! Multiplexed message decoding
//!
//! Each binary message from the lip-sync service carries one video frame and
//! one audio slice:
//!
//! ```text
//! offset        size          field
//! 0             5             ASCII video section tag ("VIDEO")
//! 5             4             u32 LE end_index, end of the video section
//! 9             4             u32 LE frame index
//! 13            4             u32 LE frame width
//! 17            4             u32 LE frame height
//! 21            end_index-12  pixel bytes (opaque to this crate)
//! end_index+9   5             ASCII audio section tag ("AUDIO")
//! end_index+14  4             audio length word (not interpreted)
//! end_index+18  rest          PCM16 LE mono samples
//! ```
//!
//! Pixel data length is deliberately not checked against width×height; the
//! renderer tolerates whatever the service sent.

use crate::error::CodecError;
use crate::media::VideoFrame;
use bytes::Bytes;

/// Byte length of the fixed video-section header (tag through height)
pub const HEADER_LEN: usize = 21;

/// Offset of the pixel data relative to `end_index`
const VIDEO_SECTION_BASE: usize = 9;

/// Gap between the end of the pixel data and the start of the PCM payload
/// (5-byte audio tag plus the 4-byte length word)
const AUDIO_HEADER_LEN: usize = 9;

/// Smallest `end_index` a well-formed message can declare (empty pixel data)
const MIN_END_INDEX: usize = HEADER_LEN - VIDEO_SECTION_BASE;

/// One inbound message split into its media parts
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// Tag bytes of the video section, carried through unvalidated
    pub video_tag: [u8; 5],
    /// Tag bytes of the audio section, carried through unvalidated
    pub audio_tag: [u8; 5],
    pub video: VideoFrame,
    /// Raw PCM16 LE bytes; decoded only when a chunk is finalized
    pub audio: Bytes,
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Split one raw message into a video frame and its PCM payload.
///
/// Fails with a malformed-frame error when the message is shorter than the
/// fixed header or when the declared `end_index` does not leave room for the
/// audio section. Never panics on arbitrary input.
pub fn decode_message(data: &Bytes) -> Result<DecodedMessage, CodecError> {
    if data.len() < HEADER_LEN {
        return Err(CodecError::MessageTooShort {
            len: data.len(),
            min: HEADER_LEN,
        });
    }

    let end_index = read_u32_le(data, 5) as usize;
    let pixel_end = end_index + VIDEO_SECTION_BASE;
    let audio_start = pixel_end + AUDIO_HEADER_LEN;

    // end_index counts from the frame-index field, so anything below the
    // fixed header remainder or past the audio header is self-inconsistent.
    if end_index < MIN_END_INDEX || audio_start > data.len() {
        return Err(CodecError::BadEndIndex {
            end_index,
            len: data.len(),
        });
    }

    let mut video_tag = [0u8; 5];
    video_tag.copy_from_slice(&data[0..5]);
    let mut audio_tag = [0u8; 5];
    audio_tag.copy_from_slice(&data[pixel_end..pixel_end + 5]);

    let video = VideoFrame {
        index: read_u32_le(data, 9),
        width: read_u32_le(data, 13),
        height: read_u32_le(data, 17),
        data: data.slice(HEADER_LEN..pixel_end),
    };

    Ok(DecodedMessage {
        video_tag,
        audio_tag,
        video,
        audio: data.slice(audio_start..),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    /// Build a wire message the way the service frames them.
    pub(crate) fn encode_message(
        index: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
        pcm: &[u8],
    ) -> Bytes {
        let end_index = (12 + pixels.len()) as u32;
        let mut buf = BytesMut::new();
        buf.put_slice(b"VIDEO");
        buf.put_u32_le(end_index);
        buf.put_u32_le(index);
        buf.put_u32_le(width);
        buf.put_u32_le(height);
        buf.put_slice(pixels);
        buf.put_slice(b"AUDIO");
        buf.put_u32_le(pcm.len() as u32);
        buf.put_slice(pcm);
        buf.freeze()
    }

    #[test]
    fn test_decode_roundtrip() {
        let pixels = vec![0xAB; 64];
        let pcm = vec![0x01, 0x02, 0x03, 0x04];
        let msg = encode_message(7, 512, 512, &pixels, &pcm);

        let decoded = decode_message(&msg).unwrap();
        assert_eq!(&decoded.video_tag, b"VIDEO");
        assert_eq!(&decoded.audio_tag, b"AUDIO");
        assert_eq!(decoded.video.index, 7);
        assert_eq!(decoded.video.width, 512);
        assert_eq!(decoded.video.height, 512);
        assert_eq!(decoded.video.data.as_ref(), &pixels[..]);
        assert_eq!(decoded.audio.as_ref(), &pcm[..]);
    }

    #[test]
    fn test_decode_empty_pixels_and_audio() {
        let msg = encode_message(0, 0, 0, &[], &[]);
        let decoded = decode_message(&msg).unwrap();
        assert!(decoded.video.data.is_empty());
        assert!(decoded.audio.is_empty());
    }

    #[test]
    fn test_short_message_rejected() {
        let msg = Bytes::from_static(b"VIDEO\x01\x02");
        let err = decode_message(&msg).unwrap_err();
        assert!(matches!(err, CodecError::MessageTooShort { len: 7, .. }));
    }

    #[test]
    fn test_end_index_past_message_rejected() {
        let mut raw = BytesMut::new();
        raw.put_slice(b"VIDEO");
        raw.put_u32_le(10_000); // declares a video section far past the end
        raw.put_u32_le(0);
        raw.put_u32_le(512);
        raw.put_u32_le(512);
        raw.put_slice(&[0u8; 32]);

        let err = decode_message(&raw.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::BadEndIndex { end_index: 10_000, .. }));
    }

    #[test]
    fn test_end_index_below_header_rejected() {
        let mut raw = BytesMut::new();
        raw.put_slice(b"VIDEO");
        raw.put_u32_le(4); // cannot even cover the fixed header
        raw.put_u32_le(0);
        raw.put_u32_le(0);
        raw.put_u32_le(0);
        raw.put_slice(&[0u8; 64]);

        let err = decode_message(&raw.freeze()).unwrap_err();
        assert!(matches!(err, CodecError::BadEndIndex { end_index: 4, .. }));
    }

    #[test]
    fn test_pixel_length_not_validated_against_dimensions() {
        // 2 pixel bytes for a claimed 512x512 frame decodes fine; the
        // renderer is the one that copes with it.
        let msg = encode_message(1, 512, 512, &[1, 2], &[0, 0]);
        let decoded = decode_message(&msg).unwrap();
        assert_eq!(decoded.video.data.len(), 2);
    }
}
