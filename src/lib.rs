mod block;
mod checkpoint;
mod config;
mod error;
mod oracle;
mod recover;
mod remote;

pub mod cipher;
pub mod forge;
pub mod lcg;
pub mod pkcs7;
pub mod prime;
pub mod server;

pub use block::BlockRecoverer;
pub use checkpoint::{Cancellation, RecoveryState};
pub use config::{RecoveryConfig, RetryPolicy, DEFAULT_BLOCK_SIZE};
pub use error::{OracleError, RecoveryError};
pub use oracle::{FnOracle, IvPrefixed, LocalOracle, PaddingOracle};
pub use recover::{
    recover, recover_unpadded, recover_with_cancellation, BlockFailure, KnownBlocks, Recovered,
};
pub use remote::{RemoteOracle, DEFAULT_TIMEOUT};
