//! Block decoder — turns a type-tagged payload into a typed [`Block`].

use prost::Message;
use prost_types::Any;

use crate::error::DecodeError;
use crate::pb::EOSIO_BLOCK_TYPE_URL;
use crate::types::Block;

/// Returns `true` if `type_url` is the canonical block type.
pub fn is_block_type(type_url: &str) -> bool {
    type_url == EOSIO_BLOCK_TYPE_URL
}

/// Decode a block payload.
///
/// The declared type is checked before any bytes are parsed; a mismatch
/// never reaches `Block::decode`.
pub fn decode_block(payload: &Any) -> Result<Block, DecodeError> {
    if !is_block_type(&payload.type_url) {
        return Err(DecodeError::SchemaMismatch {
            expected: EOSIO_BLOCK_TYPE_URL.to_string(),
            got: payload.type_url.clone(),
        });
    }
    Ok(Block::decode(payload.value.as_slice())?)
}

/// Wrap a block into the `Any` envelope the stream service sends.
pub fn encode_block(block: &Block) -> Any {
    Any {
        type_url: EOSIO_BLOCK_TYPE_URL.to_string(),
        value: block.encode_to_vec(),
    }
}
