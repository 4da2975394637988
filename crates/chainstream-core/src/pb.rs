//! Wire contract for the block stream service.
//!
//! Hand-maintained `prost` messages for the two packages the engine speaks:
//! `dfuse.bstream.v1` (the streaming request/response envelope) and the
//! subset of `dfuse.eosio.codec.v1.Block` consumed downstream. Field tags
//! follow the upstream `.proto` files so the messages stay wire-compatible.

/// `type_url` of the only block payload this engine accepts.
pub const EOSIO_BLOCK_TYPE_URL: &str = "type.googleapis.com/dfuse.eosio.codec.v1.Block";

/// gRPC path of the server-streaming `BlockStreamV2.Blocks` method.
pub const BLOCKS_PATH: &str = "/dfuse.bstream.v1.BlockStreamV2/Blocks";

pub mod bstream {
    /// For historical segments, forks are not passed.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlocksRequestV2 {
        /// Inclusive start of the stream.
        #[prost(int64, tag = "1")]
        pub start_block_num: i64,
        /// Opaque cursor; takes precedence over `start_block_num` when set.
        #[prost(string, tag = "13")]
        pub start_cursor: ::prost::alloc::string::String,
        /// Inclusive stop of the stream; `0` streams forever.
        #[prost(uint64, tag = "5")]
        pub stop_block_num: u64,
        #[prost(enumeration = "ForkStep", repeated, tag = "8")]
        pub fork_steps: ::prost::alloc::vec::Vec<i32>,
        #[prost(string, tag = "10")]
        pub include_filter_expr: ::prost::alloc::string::String,
        #[prost(string, tag = "11")]
        pub exclude_filter_expr: ::prost::alloc::string::String,
        #[prost(enumeration = "BlockDetails", tag = "15")]
        pub details: i32,
        #[prost(uint64, tag = "16")]
        pub confirmations: u64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockResponseV2 {
        /// Chain specific block payload.
        #[prost(message, optional, tag = "1")]
        pub block: ::core::option::Option<::prost_types::Any>,
        #[prost(enumeration = "ForkStep", tag = "6")]
        pub step: i32,
        #[prost(string, tag = "10")]
        pub cursor: ::prost::alloc::string::String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum ForkStep {
        StepUnknown = 0,
        /// Block is the new head block of the chain.
        StepNew = 1,
        /// Block is now forked and should be undone.
        StepUndo = 2,
        /// Block is final and can be committed to.
        StepIrreversible = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum BlockDetails {
        Full = 0,
        Light = 1,
    }
}

pub mod eosio {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
        #[prost(uint32, tag = "4")]
        pub number: u32,
        #[prost(message, optional, tag = "5")]
        pub header: ::core::option::Option<BlockHeader>,
        #[prost(bool, tag = "40")]
        pub filtering_applied: bool,
        #[prost(string, tag = "41")]
        pub filtering_include_filter_expr: ::prost::alloc::string::String,
        #[prost(string, tag = "42")]
        pub filtering_exclude_filter_expr: ::prost::alloc::string::String,
        #[prost(uint32, tag = "43")]
        pub filtered_transaction_trace_count: u32,
        #[prost(uint32, tag = "44")]
        pub filtered_executed_input_action_count: u32,
        #[prost(uint32, tag = "45")]
        pub filtered_executed_total_action_count: u32,
        #[prost(message, repeated, tag = "46")]
        pub filtered_transaction_traces: ::prost::alloc::vec::Vec<TransactionTrace>,
        #[prost(uint32, tag = "48")]
        pub filtered_transaction_count: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockHeader {
        #[prost(message, optional, tag = "1")]
        pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
        #[prost(string, tag = "2")]
        pub producer: ::prost::alloc::string::String,
        #[prost(string, tag = "4")]
        pub previous: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TransactionTrace {
        #[prost(string, tag = "1")]
        pub id: ::prost::alloc::string::String,
        #[prost(uint64, tag = "2")]
        pub block_num: u64,
        #[prost(message, optional, tag = "5")]
        pub receipt: ::core::option::Option<TransactionReceiptHeader>,
        #[prost(int64, tag = "6")]
        pub elapsed: i64,
        #[prost(uint64, tag = "7")]
        pub net_usage: u64,
        #[prost(bool, tag = "8")]
        pub scheduled: bool,
        #[prost(message, repeated, tag = "9")]
        pub action_traces: ::prost::alloc::vec::Vec<ActionTrace>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TransactionReceiptHeader {
        #[prost(int32, tag = "1")]
        pub status: i32,
        #[prost(uint32, tag = "2")]
        pub cpu_usage_micro_seconds: u32,
        #[prost(uint32, tag = "3")]
        pub net_usage_words: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ActionTrace {
        #[prost(message, optional, tag = "2")]
        pub action: ::core::option::Option<Action>,
        #[prost(string, tag = "6")]
        pub transaction_id: ::prost::alloc::string::String,
        #[prost(uint64, tag = "7")]
        pub block_num: u64,
        #[prost(string, tag = "11")]
        pub receiver: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Action {
        #[prost(string, tag = "1")]
        pub account: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub name: ::prost::alloc::string::String,
        #[prost(message, repeated, tag = "3")]
        pub authorization: ::prost::alloc::vec::Vec<PermissionLevel>,
        #[prost(string, tag = "4")]
        pub json_data: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PermissionLevel {
        #[prost(string, tag = "1")]
        pub actor: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub permission: ::prost::alloc::string::String,
    }
}

#[cfg(test)]
mod tests {
    use super::bstream::*;
    use prost::Message;

    #[test]
    fn fork_step_irreversible_value() {
        assert_eq!(ForkStep::StepIrreversible as i32, 4);
        assert_eq!(ForkStep::try_from(4).ok(), Some(ForkStep::StepIrreversible));
    }

    #[test]
    fn request_keeps_filter_fields() {
        let req = BlocksRequestV2 {
            start_block_num: 100,
            stop_block_num: 105,
            fork_steps: vec![ForkStep::StepIrreversible as i32],
            include_filter_expr: String::new(),
            exclude_filter_expr: "action == \"*\"".into(),
            ..Default::default()
        };
        let decoded = BlocksRequestV2::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.exclude_filter_expr, "action == \"*\"");
        assert_eq!(decoded.fork_steps, vec![4]);
    }
}
