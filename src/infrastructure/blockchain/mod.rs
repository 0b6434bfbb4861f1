//! Solana ledger access: RPC and local signing

pub mod rpc_client;
pub mod signer;

pub use rpc_client::SolanaRpcClient;
pub use signer::KeypairSigner;
