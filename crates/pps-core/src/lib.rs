pub mod codec;
pub mod message;
pub mod value;

pub use codec::{
    decode, encode, encode_message, CodecError, CodecWarning, DecodeReport, EncodeReport,
    Encoding,
};
pub use message::{ObjectStatus, PpsMessage, ROOT_OBJECT_NAME};
pub use value::{to_attributes, to_value, Attributes, PpsValue, ValueError};
