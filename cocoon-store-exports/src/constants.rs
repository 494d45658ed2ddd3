// Copyright (c) 2023 The Cocoon Authors

/// name -> ledger
pub const LEDGERS_CF: &str = "ledgers";
/// `<ledger>\0<id>` -> transaction
pub const TRANSACTIONS_CF: &str = "transactions";
/// `<ledger>\0<key>\0<createdAt><seq>` -> id, one entry per version of a key
pub const TX_KEYS_CF: &str = "tx_keys";
/// id -> ledger, keeps transaction ids unique
pub const TX_IDS_CF: &str = "tx_ids";
/// name -> chain
pub const CHAINS_CF: &str = "chains";
/// `<chain>\0<id>` -> block
pub const BLOCKS_CF: &str = "blocks";
/// `<chain>\0<number>` -> block id
pub const BLOCK_NUMBERS_CF: &str = "block_numbers";
/// `<chain>\0<prevBlockHash>` -> block id
pub const BLOCK_PREV_HASHES_CF: &str = "block_prev_hashes";
/// counters
pub const METADATA_CF: &str = "metadata";

/// All column families
pub const COLUMN_FAMILIES: [&str; 9] = [
    LEDGERS_CF,
    TRANSACTIONS_CF,
    TX_KEYS_CF,
    TX_IDS_CF,
    CHAINS_CF,
    BLOCKS_CF,
    BLOCK_NUMBERS_CF,
    BLOCK_PREV_HASHES_CF,
    METADATA_CF,
];

/// Key of the sequence counter in [`METADATA_CF`]
pub const SEQUENCE_KEY: &[u8; 1] = b"s";

/// Separator of composite keys
pub const KEY_SEPARATOR: u8 = 0;

/// Receipt error of a transaction whose id is taken
pub const DUPLICATE_TX_ID_ERROR: &str = "transaction with matching id already exists";

// Errors
/// Column family lookup failure
pub const CF_ERROR: &str = "critical: rocksdb column family operation failed";
/// Open failure
pub const OPEN_ERROR: &str = "critical: rocksdb open operation failed";
/// Stored record could not be decoded
pub const RECORD_DESER_ERROR: &str = "critical: record deserialization failed";
