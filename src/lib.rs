//! seeksst: a sorted-string-table library built around two accelerants for
//! sorted data: a discriminative-bit (DBit) index inside every data block,
//! and a pilot-driven merge across multiple sorted levels.

#[cfg(feature = "command_line")]
#[macro_use]
extern crate arrrg_derive;

extern crate prototk;
#[macro_use]
extern crate prototk_derive;

use std::fmt::{Debug, Display, Formatter};

use biometrics::Counter;
use buffertk::{stack_pack, v64, Unpacker};
use tatl::{HeyListen, Stationary};
use zerror::{iotoz, Z};
use zerror_core::ErrorCore;

pub mod block;
pub mod dbit;
pub mod file_manager;
pub mod index;
pub mod level_iterator;
pub mod merging_cursor;
pub mod pilot_mars;
pub mod pilot_perkey;
pub mod reference;
pub mod table;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static LOGIC_ERROR: Counter = Counter::new("seeksst.logic_error");
static LOGIC_ERROR_MONITOR: Stationary = Stationary::new("seeksst.logic_error", &LOGIC_ERROR);

static CORRUPTION: Counter = Counter::new("seeksst.corruption");
static CORRUPTION_MONITOR: Stationary = Stationary::new("seeksst.corruption", &CORRUPTION);

static KEY_TOO_LARGE: Counter = Counter::new("seeksst.error.key_too_large");
static KEY_TOO_LARGE_MONITOR: Stationary =
    Stationary::new("seeksst.error.key_too_large", &KEY_TOO_LARGE);

static VALUE_TOO_LARGE: Counter = Counter::new("seeksst.error.value_too_large");
static VALUE_TOO_LARGE_MONITOR: Stationary =
    Stationary::new("seeksst.error.value_too_large", &VALUE_TOO_LARGE);

static TABLE_FULL: Counter = Counter::new("seeksst.error.table_full");
static TABLE_FULL_MONITOR: Stationary = Stationary::new("seeksst.error.table_full", &TABLE_FULL);

static DBIT_FALLBACK: Counter = Counter::new("seeksst.dbit.fallback_to_plain_block");
static DBIT_FALLBACK_MONITOR: Stationary = Stationary::new(
    "seeksst.dbit.fallback_to_plain_block",
    &DBIT_FALLBACK,
);

/// Register every [Counter] this crate defines with a process-wide collector.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&LOGIC_ERROR);
    collector.register_counter(&CORRUPTION);
    collector.register_counter(&KEY_TOO_LARGE);
    collector.register_counter(&VALUE_TOO_LARGE);
    collector.register_counter(&TABLE_FULL);
    collector.register_counter(&DBIT_FALLBACK);
    file_manager::register_biometrics(collector);
}

/// Register every [Stationary] monitor this crate defines.
pub fn register_monitors(hey_listen: &mut HeyListen) {
    hey_listen.register_stationary(&LOGIC_ERROR_MONITOR);
    hey_listen.register_stationary(&CORRUPTION_MONITOR);
    hey_listen.register_stationary(&KEY_TOO_LARGE_MONITOR);
    hey_listen.register_stationary(&VALUE_TOO_LARGE_MONITOR);
    hey_listen.register_stationary(&TABLE_FULL_MONITOR);
    hey_listen.register_stationary(&DBIT_FALLBACK_MONITOR);
    file_manager::register_monitors(hey_listen);
}

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Largest key this crate will accept from a builder.
pub const MAX_KEY_LEN: usize = 1usize << 14; /* 16KiB */
/// Largest value this crate will accept from a builder.
pub const MAX_VALUE_LEN: usize = 1usize << 15; /* 32KiB */

// NOTE: this is an approximate size.  Once a table's accumulated key/value bytes exceed it, the
// builder returns TableFull.  The table may exceed this by up to one key-value pair's worth of
// slop before the check fires.
/// Once a table's estimated size reaches this many bytes, further `Add` calls fail.
pub const TABLE_FULL_SIZE: usize = (1usize << 30) - (1usize << 26); /* 1GiB - 64MiB */

/// Default size, in bytes, at which a data block is flushed.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
/// Default page alignment that blocks are padded out to.
pub const DEFAULT_PAGE_ALIGNMENT: u64 = 4096;
/// Number of bytes in a block trailer: one compression tag byte, one fixed32 masked CRC32c.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// `kSpace`: the number of keys a single Mars pilot chunk covers.
pub const MARS_KSPACE: usize = 256;
/// Default threshold below which the level iterator scans `levels[]` linearly instead of via
/// binary search.
pub const DEFAULT_BINARY_SEEK_THRESHOLD: usize = 8;

/// Footer magic, version 5.
pub const FOOTER_MAGIC: u64 = 0xdbba_d01b_eefe_0f44;
/// The only footer version this crate writes or accepts.
pub const FOOTER_VERSION: u32 = 5;
/// Fixed on-disk size of the version-5 footer.
pub const FOOTER_SIZE: usize = 53;
// 1 (checksum_type) + 2 * 20 (max varint-encoded BlockHandle) + 4 (version) + 8 (magic) = 53.
const FOOTER_HANDLES_REGION: usize = 40;

/// Name of the metaindex entry that points at the pilot block, when one is present.
pub const METAINDEX_PILOT_KEY: &[u8] = b"seek.pilot";
/// Name of the metaindex entry that points at the Mars pilot block, when one is present.
pub const METAINDEX_MARS_PILOT_KEY: &[u8] = b"seek.pilot.mars";

/// Past-end sentinel bit used by the per-key pilot's restart positions.
pub const PILOT_PAST_END: u16 = 0x8000;

fn check_key_len(key: &[u8]) -> Result<(), Error> {
    if key.is_empty() {
        LOGIC_ERROR.click();
        return Err(Error::LogicError {
            core: ErrorCore::default(),
            context: "keys must be non-empty".to_string(),
        });
    }
    if key.len() > MAX_KEY_LEN {
        KEY_TOO_LARGE.click();
        return Err(Error::KeyTooLarge {
            core: ErrorCore::default(),
            length: key.len(),
            limit: MAX_KEY_LEN,
        });
    }
    Ok(())
}

fn check_value_len(value: &[u8]) -> Result<(), Error> {
    if value.len() > MAX_VALUE_LEN {
        VALUE_TOO_LARGE.click();
        return Err(Error::ValueTooLarge {
            core: ErrorCore::default(),
            length: value.len(),
            limit: MAX_VALUE_LEN,
        });
    }
    Ok(())
}

fn check_table_size(size: usize) -> Result<(), Error> {
    if size >= TABLE_FULL_SIZE {
        TABLE_FULL.click();
        return Err(Error::TableFull {
            core: ErrorCore::default(),
            size,
            limit: TABLE_FULL_SIZE,
        });
    }
    Ok(())
}

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// The one error type surfaced by this crate, per the error taxonomy of Corruption / OutOfRange /
/// IOError / LogicError.  `OutOfRange` is intentionally absent: an exhausted iterator is a normal
/// terminal state (`key()`/`value()` return `None`), not a `Result::Err`.
#[derive(Clone, Debug, Message)]
pub enum Error {
    #[prototk(663680, message)]
    Success {
        #[prototk(1, message)]
        core: ErrorCore,
    },
    #[prototk(663681, message)]
    KeyTooLarge {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        length: usize,
        #[prototk(3, uint64)]
        limit: usize,
    },
    #[prototk(663682, message)]
    ValueTooLarge {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        length: usize,
        #[prototk(3, uint64)]
        limit: usize,
    },
    #[prototk(663683, message)]
    KeysMustBeInOrder {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, bytes)]
        last_key: Vec<u8>,
        #[prototk(3, bytes)]
        new_key: Vec<u8>,
    },
    #[prototk(663684, message)]
    TableFull {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        size: usize,
        #[prototk(3, uint64)]
        limit: usize,
    },
    #[prototk(663685, message)]
    BlockTooSmall {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        length: usize,
        #[prototk(3, uint64)]
        required: usize,
    },
    #[prototk(663686, message)]
    UnpackError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, message)]
        error: prototk::Error,
        #[prototk(3, string)]
        context: String,
    },
    #[prototk(663687, message)]
    CrcFailure {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        start: u64,
        #[prototk(3, uint64)]
        limit: u64,
        #[prototk(4, fixed32)]
        crc32c: u32,
    },
    #[prototk(663688, message)]
    UnknownFooterMagic {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, fixed64)]
        magic: u64,
    },
    #[prototk(663689, message)]
    UnknownFooterVersion {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint32)]
        version: u32,
    },
    #[prototk(663690, message)]
    BadDBitSidecar {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        context: String,
    },
    #[prototk(663691, message)]
    PilotIndexOutOfRange {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        index: u64,
        #[prototk(3, uint64)]
        limit: u64,
    },
    #[prototk(663692, message)]
    Corruption {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        context: String,
    },
    #[prototk(663693, message)]
    LogicError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        context: String,
    },
    #[prototk(663694, message)]
    SystemError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    #[prototk(663695, message)]
    FileHandleError {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, string)]
        what: String,
    },
    #[prototk(663696, message)]
    TooManyOpenFiles {
        #[prototk(1, message)]
        core: ErrorCore,
        #[prototk(2, uint64)]
        limit: usize,
    },
}

impl Error {
    fn core(&self) -> &ErrorCore {
        match self {
            Error::Success { core } => core,
            Error::KeyTooLarge { core, .. } => core,
            Error::ValueTooLarge { core, .. } => core,
            Error::KeysMustBeInOrder { core, .. } => core,
            Error::TableFull { core, .. } => core,
            Error::BlockTooSmall { core, .. } => core,
            Error::UnpackError { core, .. } => core,
            Error::CrcFailure { core, .. } => core,
            Error::UnknownFooterMagic { core, .. } => core,
            Error::UnknownFooterVersion { core, .. } => core,
            Error::BadDBitSidecar { core, .. } => core,
            Error::PilotIndexOutOfRange { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::FileHandleError { core, .. } => core,
            Error::TooManyOpenFiles { core, .. } => core,
        }
    }

    fn core_mut(&mut self) -> &mut ErrorCore {
        match self {
            Error::Success { core } => core,
            Error::KeyTooLarge { core, .. } => core,
            Error::ValueTooLarge { core, .. } => core,
            Error::KeysMustBeInOrder { core, .. } => core,
            Error::TableFull { core, .. } => core,
            Error::BlockTooSmall { core, .. } => core,
            Error::UnpackError { core, .. } => core,
            Error::CrcFailure { core, .. } => core,
            Error::UnknownFooterMagic { core, .. } => core,
            Error::UnknownFooterVersion { core, .. } => core,
            Error::BadDBitSidecar { core, .. } => core,
            Error::PilotIndexOutOfRange { core, .. } => core,
            Error::Corruption { core, .. } => core,
            Error::LogicError { core, .. } => core,
            Error::SystemError { core, .. } => core,
            Error::FileHandleError { core, .. } => core,
            Error::TooManyOpenFiles { core, .. } => core,
        }
    }

    /// True for the variants the error-handling design calls out as debug-only LogicErrors.  In
    /// release builds, callers should construct the `Corruption` they'd degrade to instead.
    pub fn is_logic_error(&self) -> bool {
        matches!(self, Error::LogicError { .. })
    }
}

impl Default for Error {
    fn default() -> Self {
        Error::Success {
            core: ErrorCore::default(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Success { .. } => fmt.debug_struct("Success").finish(),
            Error::KeyTooLarge { length, limit, .. } => fmt
                .debug_struct("KeyTooLarge")
                .field("length", length)
                .field("limit", limit)
                .finish(),
            Error::ValueTooLarge { length, limit, .. } => fmt
                .debug_struct("ValueTooLarge")
                .field("length", length)
                .field("limit", limit)
                .finish(),
            Error::KeysMustBeInOrder {
                last_key, new_key, ..
            } => fmt
                .debug_struct("KeysMustBeInOrder")
                .field("last_key", last_key)
                .field("new_key", new_key)
                .finish(),
            Error::TableFull { size, limit, .. } => fmt
                .debug_struct("TableFull")
                .field("size", size)
                .field("limit", limit)
                .finish(),
            Error::BlockTooSmall {
                length, required, ..
            } => fmt
                .debug_struct("BlockTooSmall")
                .field("length", length)
                .field("required", required)
                .finish(),
            Error::UnpackError { error, context, .. } => fmt
                .debug_struct("UnpackError")
                .field("error", error)
                .field("context", context)
                .finish(),
            Error::CrcFailure {
                start,
                limit,
                crc32c,
                ..
            } => fmt
                .debug_struct("CrcFailure")
                .field("start", start)
                .field("limit", limit)
                .field("crc32c", crc32c)
                .finish(),
            Error::UnknownFooterMagic { magic, .. } => fmt
                .debug_struct("UnknownFooterMagic")
                .field("magic", magic)
                .finish(),
            Error::UnknownFooterVersion { version, .. } => fmt
                .debug_struct("UnknownFooterVersion")
                .field("version", version)
                .finish(),
            Error::BadDBitSidecar { context, .. } => fmt
                .debug_struct("BadDBitSidecar")
                .field("context", context)
                .finish(),
            Error::PilotIndexOutOfRange { index, limit, .. } => fmt
                .debug_struct("PilotIndexOutOfRange")
                .field("index", index)
                .field("limit", limit)
                .finish(),
            Error::Corruption { context, .. } => fmt
                .debug_struct("Corruption")
                .field("context", context)
                .finish(),
            Error::LogicError { context, .. } => fmt
                .debug_struct("LogicError")
                .field("context", context)
                .finish(),
            Error::SystemError { what, .. } => {
                fmt.debug_struct("SystemError").field("what", what).finish()
            }
            Error::FileHandleError { what, .. } => fmt
                .debug_struct("FileHandleError")
                .field("what", what)
                .finish(),
            Error::TooManyOpenFiles { limit, .. } => fmt
                .debug_struct("TooManyOpenFiles")
                .field("limit", limit)
                .finish(),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(what: std::io::Error) -> Error {
        Error::SystemError {
            core: ErrorCore::default(),
            what: format!("{what:?}"),
        }
    }
}

impl From<buffertk::Error> for Error {
    fn from(error: buffertk::Error) -> Error {
        let err: prototk::Error = error.into();
        Error::from(err)
    }
}

impl From<prototk::Error> for Error {
    fn from(error: prototk::Error) -> Error {
        Error::UnpackError {
            core: ErrorCore::default(),
            error,
            context: "From<prototk::Error>".to_owned(),
        }
    }
}

impl Z for Error {
    type Error = Self;

    fn long_form(&self) -> String {
        format!("{}", self) + "\n" + &self.core().long_form()
    }

    fn with_token(mut self, identifier: &str, value: &str) -> Self::Error {
        self.core_mut().set_token(identifier, value);
        self
    }

    fn with_url(mut self, identifier: &str, url: &str) -> Self::Error {
        self.core_mut().set_url(identifier, url);
        self
    }

    fn with_variable<X: Debug>(mut self, variable: &str, x: X) -> Self::Error {
        self.core_mut().set_variable(variable, x);
        self
    }
}

iotoz! {Error}

/////////////////////////////////////////// error helpers //////////////////////////////////////////

/// Annotate `err` with the path the operation that produced it was acting on.  Used by
/// [file_manager] so a failure deep in `std::fs` surfaces with the path attached.
pub(crate) fn error_with_path(err: Error, path: std::borrow::Cow<'_, str>) -> Error {
    err.with_variable("path", path.into_owned())
}

/// Wrap a raw `std::io::Error` as a [Error::SystemError] with `context` attached.
pub(crate) fn system_error_with_context(err: std::io::Error, context: impl Into<String>) -> Error {
    Error::SystemError {
        core: ErrorCore::default(),
        what: format!("{err:?}"),
    }
    .with_variable("context", context.into())
}

/// Like [system_error_with_context], additionally annotated with the path under operation.
pub(crate) fn system_error_with_path_and_context(
    err: std::io::Error,
    path: std::borrow::Cow<'_, str>,
    context: impl Into<String>,
) -> Error {
    system_error_with_context(err, context.into()).with_variable("path", path.into_owned())
}

/// A negative file descriptor escaped from the kernel; this is an invariant violation in
/// [file_manager], never a user-triggerable error.
pub(crate) fn logic_error_file_descriptor_negative(fd: std::ffi::c_int) -> Error {
    LOGIC_ERROR.click();
    Error::LogicError {
        core: ErrorCore::default(),
        context: "file descriptor is negative".to_string(),
    }
    .with_variable("fd", fd)
}

/// [file_manager]'s by-fd bookkeeping table disagrees with a handle it itself returned.
pub(crate) fn logic_error_file_manager_broken_pointer(fd: usize) -> Error {
    LOGIC_ERROR.click();
    Error::LogicError {
        core: ErrorCore::default(),
        context: "file manager's fd table is inconsistent with a live handle".to_string(),
    }
    .with_variable("fd", fd)
}

/// The file manager has `limit` open files already and cannot open another.
pub(crate) fn too_many_open_files(limit: usize, current: usize) -> Error {
    Error::TooManyOpenFiles {
        core: ErrorCore::default(),
        limit,
    }
    .with_variable("current", current)
}

/// Convert a raw `std::io::Result` into this crate's `Error`, preserving [From<std::io::Error>].
pub(crate) fn io_result<T>(result: std::io::Result<T>) -> Result<T, Error> {
    result.map_err(Error::from)
}

///////////////////////////////////////////// RandomRead ////////////////////////////////////////////

/// The only capability [table::TableReader] needs from the opaque I/O layer: read a span of bytes
/// at an absolute offset, and report the file's total size.  [file_manager::FileHandle] and
/// `Arc<Vec<u8>>` (for in-memory tables built and read back within a single process) both
/// implement it.
pub trait RandomRead {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error>;
    /// The total size of the underlying file, in bytes.
    fn size(&self) -> Result<u64, Error>;
}

impl RandomRead for std::sync::Arc<Vec<u8>> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.len() {
            return Err(Error::BlockTooSmall {
                core: ErrorCore::default(),
                length: self.len(),
                required: end,
            });
        }
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }

    fn size(&self) -> Result<u64, Error> {
        Ok(self.len() as u64)
    }
}

////////////////////////////////////////////// Options /////////////////////////////////////////////

/// Tunables for [table::TableBuilder]: when to flush the current data block, and how the file is
/// page-aligned.  Mirrors the teacher's per-block options struct, generalized to the table level
/// since spec.md's blocks have no restart-interval knob of their own (every key is a restart).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct TableBuilderOptions {
    /// Flush the current data block once its estimated size would exceed this many bytes.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Flush a data block once it reaches this size.", "BYTES")
    )]
    pub block_size: usize,
    /// Pad every block (and the index/pilot/metaindex blocks) out to a multiple of this many
    /// bytes.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Pad blocks to a multiple of this many bytes.", "BYTES")
    )]
    pub page_alignment: u64,
}

impl Default for TableBuilderOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            page_alignment: DEFAULT_PAGE_ALIGNMENT,
        }
    }
}

/// Tunables for the DBit intra-block index (§4.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct DBitOptions {
    /// Build a DBit sidecar for every data block.  When `false`, blocks are always plain.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Build a DBit sidecar for every data block.", "BOOL")
    )]
    pub enabled: bool,
    /// A block whose discriminative-bit count would exceed this falls back to a plain block
    /// (spec.md §4.2.2: ranks are one byte wide, so this cannot exceed 255).
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Maximum discriminative bits per block.", "COUNT")
    )]
    pub max_discriminators: usize,
}

impl Default for DBitOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            max_discriminators: 255,
        }
    }
}

/// Tunables for [level_iterator::LevelIterator].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct LevelIteratorOptions {
    /// Below this many entries in a pilot's `levels[]`, `Seek` scans linearly instead of doing a
    /// binary search over the occurrence counts (spec.md §4.7, §9).
    #[cfg_attr(
        feature = "command_line",
        arrrg(
            optional,
            "Scan linearly below this many pilot-level entries.",
            "COUNT"
        )
    )]
    pub binary_seek_threshold: usize,
}

impl Default for LevelIteratorOptions {
    fn default() -> Self {
        Self {
            binary_seek_threshold: DEFAULT_BINARY_SEEK_THRESHOLD,
        }
    }
}

/// Tunables for [file_manager::FileManager].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct FileManagerOptions {
    /// Refuse to open another file once this many are held open simultaneously.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Maximum number of files to hold open at once.", "COUNT")
    )]
    pub max_open_files: usize,
}

impl Default for FileManagerOptions {
    fn default() -> Self {
        Self {
            max_open_files: 1 << 20,
        }
    }
}

//////////////////////////////////////////// TableMetadata //////////////////////////////////////////

/// Summary information about a table file, as printed by `sst-stat` and returned by
/// [file_manager::FileManager::stat].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableMetadata {
    pub file_size: u64,
    pub index_block: BlockHandle,
    pub metaindex_block: BlockHandle,
    pub pilot_block: Option<BlockHandle>,
    pub num_entries: u64,
    pub num_data_blocks: u64,
}

/////////////////////////////////////////////// Cursor /////////////////////////////////////////////

/// The universal iterator capability set this crate's block, table, and level iterators all
/// implement.  There is no timestamp/MVCC dimension: keys are plain bytes and ordering is
/// bytewise-unsigned, per the comparator contract.
pub trait Cursor {
    /// Reposition at the smallest key.  Afterwards `key()`/`value()` are `None` until `next()`.
    fn seek_to_first(&mut self) -> Result<(), Error>;
    /// Reposition at the largest key.  Afterwards `key()`/`value()` are `None` until `prev()`.
    fn seek_to_last(&mut self) -> Result<(), Error>;
    /// Reposition so that a subsequent `next()` yields the smallest key >= `key`.
    fn seek(&mut self, key: &[u8]) -> Result<(), Error>;
    /// Reposition so that a subsequent `prev()` yields the largest key <= `key`.
    fn seek_for_prev(&mut self, key: &[u8]) -> Result<(), Error>;
    /// Move to the previous key in the sequence.
    fn prev(&mut self) -> Result<(), Error>;
    /// Move to the next key in the sequence.
    fn next(&mut self) -> Result<(), Error>;
    /// The key at the current position, or `None` if unpositioned / exhausted.
    fn key(&self) -> Option<&[u8]>;
    /// The value at the current position, or `None` if unpositioned / exhausted.
    fn value(&self) -> Option<&[u8]>;

    /// Convenience accessor combining `key()` and `value()`.
    fn key_value(&self) -> Option<KeyValueRef<'_>> {
        match (self.key(), self.value()) {
            (Some(key), Some(value)) => Some(KeyValueRef { key, value }),
            _ => None,
        }
    }
}

////////////////////////////////////////////// KeyRef //////////////////////////////////////////////

/// A borrowed key, ordered bytewise-unsigned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyRef<'a> {
    pub key: &'a [u8],
}

impl<'a> KeyRef<'a> {
    pub fn new(key: &'a [u8]) -> Self {
        Self { key }
    }
}

impl<'a> Ord for KeyRef<'a> {
    fn cmp(&self, rhs: &Self) -> std::cmp::Ordering {
        compare_bytes(self.key, rhs.key)
    }
}

impl<'a> PartialOrd for KeyRef<'a> {
    fn partial_cmp(&self, rhs: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(rhs))
    }
}

///////////////////////////////////////////// KeyValueRef //////////////////////////////////////////

/// A borrowed key-value pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyValueRef<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> Display for KeyValueRef<'a> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            fmt,
            "\"{}\" -> \"{}\"",
            String::from_utf8_lossy(self.key),
            String::from_utf8_lossy(self.value)
        )
    }
}

///////////////////////////////////////////// comparator ///////////////////////////////////////////

/// The one comparator this crate supports: bytewise unsigned order.
pub fn compare_bytes(lhs: &[u8], rhs: &[u8]) -> std::cmp::Ordering {
    lhs.cmp(rhs)
}

/// Length, in bytes, of the longest common prefix of `lhs` and `rhs`.
pub fn shared_prefix_len(lhs: &[u8], rhs: &[u8]) -> usize {
    let max = std::cmp::min(lhs.len(), rhs.len());
    let mut idx = 0;
    while idx < max && lhs[idx] == rhs[idx] {
        idx += 1;
    }
    idx
}

////////////////////////////////////////////// crc32c //////////////////////////////////////////////

/// Mask a raw CRC32c the way every block trailer in this format stores it, so that computing the
/// CRC of data that contains a CRC does not produce the same bit pattern.
pub fn mask_crc32c(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(0xa282_ead8)
}

/// Invert [mask_crc32c].
pub fn unmask_crc32c(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(0xa282_ead8);
    (rot >> 17) | (rot << 15)
}

/// Compute and mask the CRC32c of `content` followed by the one-byte compression tag.
pub fn block_trailer_crc32c(content: &[u8], compression_tag: u8) -> u32 {
    let mut digest = crc32c::crc32c(content);
    digest = crc32c::crc32c_append(digest, &[compression_tag]);
    mask_crc32c(digest)
}

/// Append a 5-byte block trailer (`[compression_tag][masked crc32c]`) to `buf`, covering
/// `content`.
pub fn append_block_trailer(buf: &mut Vec<u8>, content: &[u8], compression_tag: u8) {
    let masked = block_trailer_crc32c(content, compression_tag);
    buf.push(compression_tag);
    buf.extend_from_slice(&masked.to_le_bytes());
}

/// Verify a trailer read alongside `content`; `trailer` must be exactly [BLOCK_TRAILER_SIZE]
/// bytes.
pub fn verify_block_trailer(content: &[u8], trailer: &[u8]) -> Result<(), Error> {
    if trailer.len() != BLOCK_TRAILER_SIZE {
        return Err(Error::BlockTooSmall {
            core: ErrorCore::default(),
            length: trailer.len(),
            required: BLOCK_TRAILER_SIZE,
        });
    }
    let compression_tag = trailer[0];
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&trailer[1..5]);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = block_trailer_crc32c(content, compression_tag);
    if expected != actual {
        CORRUPTION.click();
        return Err(Error::CrcFailure {
            core: ErrorCore::default(),
            start: 0,
            limit: content.len() as u64,
            crc32c: actual,
        });
    }
    Ok(())
}

/// Bytes needed to pad `len` up to the next multiple of `alignment` (0 if already aligned).
pub fn padding_for_alignment(len: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return 0;
    }
    let rem = len % alignment;
    if rem == 0 {
        0
    } else {
        alignment - rem
    }
}

////////////////////////////////////////////// BlockHandle /////////////////////////////////////////

/// A pointer to a block within a table file.  `restarts` is an in-memory-only field: the on-wire
/// `BlockHandle` is just `varint(offset) varint(size)`; callers that need `restarts` on disk (the
/// index block does) serialize it as a sibling field of [index::IndexValue] instead.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
    pub restarts: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, size: u64, restarts: u64) -> Self {
        Self {
            offset,
            size,
            restarts,
        }
    }

    /// Encode the wire portion (`offset`, `size`) of this handle, appending to `buf`.
    pub fn pack_wire(&self, buf: &mut Vec<u8>) {
        let offset: v64 = self.offset.into();
        let size: v64 = self.size.into();
        buf.extend_from_slice(&stack_pack(offset).pack(size).to_vec());
    }

    /// Decode the wire portion (`offset`, `size`) of a handle from the front of `buf`, returning
    /// the handle (with `restarts = 0`) and the remaining bytes.
    pub fn unpack_wire(buf: &[u8]) -> Result<(Self, &[u8]), Error> {
        let mut up = Unpacker::new(buf);
        let offset: v64 = up.unpack()?;
        let size: v64 = up.unpack()?;
        let rest = up.remain();
        Ok((
            Self {
                offset: offset.into(),
                size: size.into(),
                restarts: 0,
            },
            rest,
        ))
    }

    /// Read the block this handle points to (content bytes only, trailer stripped and verified)
    /// from `bytes`, which must cover at least `[offset, offset+size+BLOCK_TRAILER_SIZE)`.
    pub fn load<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], Error> {
        let start = self.offset as usize;
        let end = start + self.size as usize;
        let trailer_end = end + BLOCK_TRAILER_SIZE;
        if bytes.len() < trailer_end {
            return Err(Error::BlockTooSmall {
                core: ErrorCore::default(),
                length: bytes.len(),
                required: trailer_end,
            });
        }
        let content = &bytes[start..end];
        let trailer = &bytes[end..trailer_end];
        verify_block_trailer(content, trailer)?;
        Ok(content)
    }
}

///////////////////////////////////////////////// Footer ///////////////////////////////////////////

/// The fixed-size record at the end of every table file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Footer {
    pub checksum_type: u8,
    pub metaindex_handle: BlockHandle,
    pub index_handle: BlockHandle,
}

impl Footer {
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut out = [0u8; FOOTER_SIZE];
        out[0] = self.checksum_type;
        let mut handles = Vec::with_capacity(FOOTER_HANDLES_REGION);
        self.metaindex_handle.pack_wire(&mut handles);
        self.index_handle.pack_wire(&mut handles);
        assert!(handles.len() <= FOOTER_HANDLES_REGION);
        out[1..1 + handles.len()].copy_from_slice(&handles);
        out[41..45].copy_from_slice(&FOOTER_VERSION.to_le_bytes());
        out[45..53].copy_from_slice(&FOOTER_MAGIC.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != FOOTER_SIZE {
            return Err(Error::BlockTooSmall {
                core: ErrorCore::default(),
                length: bytes.len(),
                required: FOOTER_SIZE,
            });
        }
        let mut magic_bytes = [0u8; 8];
        magic_bytes.copy_from_slice(&bytes[45..53]);
        let magic = u64::from_le_bytes(magic_bytes);
        if magic != FOOTER_MAGIC {
            CORRUPTION.click();
            return Err(Error::UnknownFooterMagic {
                core: ErrorCore::default(),
                magic,
            });
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[41..45]);
        let version = u32::from_le_bytes(version_bytes);
        if version != FOOTER_VERSION {
            CORRUPTION.click();
            return Err(Error::UnknownFooterVersion {
                core: ErrorCore::default(),
                version,
            });
        }
        let checksum_type = bytes[0];
        let (metaindex_handle, rest) = BlockHandle::unpack_wire(&bytes[1..41])?;
        let (index_handle, _rest) = BlockHandle::unpack_wire(rest)?;
        Ok(Self {
            checksum_type,
            metaindex_handle,
            index_handle,
        })
    }
}
