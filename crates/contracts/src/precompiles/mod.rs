pub mod delayed_executor;
pub mod erc7579;
pub mod multisig_signer;
pub mod recovery_guardian;
pub mod signature_verifier;

pub use delayed_executor::*;
pub use erc7579::*;
pub use multisig_signer::*;
pub use recovery_guardian::*;
pub use signature_verifier::*;
