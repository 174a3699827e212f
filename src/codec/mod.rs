//! Decoders for the lip-sync wire format
//!
//! One inbound message carries a video frame section followed by an audio
//! section; `frame` splits a message into the two, `pcm` turns accumulated
//! PCM16 bytes into playable samples.

pub mod frame;
pub mod pcm;

pub use frame::{decode_message, DecodedMessage};
pub use pcm::decode_pcm16;
