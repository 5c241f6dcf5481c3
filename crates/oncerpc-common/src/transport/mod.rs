pub mod codec;
pub mod frame;

pub use codec::JsonCodec;
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
