use alloy_primitives::{Bytes, U256};

pub use IMultiSigSigner::{
    IMultiSigSignerErrors as MultiSigSignerError, IMultiSigSignerEvents as MultiSigSignerEvent,
};

crate::sol! {
    /// MultiSigSigner interface for ERC-7913 threshold signer sets
    ///
    /// Each account owns one signer set. Signers are ERC-7913 identities:
    /// either a bare 20-byte address or `verifier || key`. A signature is
    /// valid when the presented signers, sorted by `keccak256(signer)`, are
    /// members with valid signatures whose combined weight reaches the
    /// threshold. Unweighted sets count every signer as weight 1.
    #[derive(Debug, PartialEq, Eq)]
    interface IMultiSigSigner {
        /// Add signers to the caller's set
        ///
        /// @param signers ERC-7913 signer identities, each at least 20 bytes
        function addSigners(bytes[] calldata signers) external;

        /// Add signers that confirmed their own addition
        ///
        /// @param signers ERC-7913 signer identities
        /// @param confirmations One signature per signer over the MultisigConfirmation digest
        /// @param deadline Timestamp after which confirmations are rejected
        function addConfirmedSigners(
            bytes[] calldata signers,
            bytes[] calldata confirmations,
            uint256 deadline
        ) external;

        /// Remove signers from the caller's set
        /// The threshold must remain reachable afterwards
        ///
        /// @param signers ERC-7913 signer identities to remove
        function removeSigners(bytes[] calldata signers) external;

        /// @param threshold New threshold, must be reachable
        function setThreshold(uint64 threshold) external;

        /// @param signers Existing signers
        /// @param weights New weights, one per signer, each non-zero
        function setSignerWeights(bytes[] calldata signers, uint64[] calldata weights) external;

        /// Store a validated signature so that a later empty signature counts
        ///
        /// @param account The account whose signer produced the signature
        /// @param signer The signer identity
        /// @param hash The signed digest
        /// @param signature The signature to validate now
        function presign(
            address account,
            bytes calldata signer,
            bytes32 hash,
            bytes calldata signature
        ) external;

        /// @param account The account address
        /// @return signers The account's signers in insertion order
        function getSigners(address account) external view returns (bytes[] memory signers);

        /// @param account The account address
        /// @return threshold The account's threshold
        function threshold(address account) external view returns (uint64 threshold);

        /// ERC-7579 stateful validator entry point
        ///
        /// @param sender The caller of isValidSignature on the account
        /// @param hash The digest to validate
        /// @param signature ABI-encoded (bytes[] signers, bytes[] signatures)
        /// @return magicValue 0x1626ba7e if valid
        function isValidSignatureWithSender(
            address sender,
            bytes32 hash,
            bytes calldata signature
        ) external view returns (bytes4 magicValue);

        // Events
        event ERC7913SignerAdded(address indexed account, bytes signer);
        event ERC7913SignerRemoved(address indexed account, bytes signer);
        event ERC7913ThresholdSet(address indexed account, uint64 threshold);
        event ERC7913SignerWeightChanged(address indexed account, bytes signer, uint64 weight);
        event ERC7913SignaturePresigned(
            address indexed account,
            bytes32 indexed hash,
            bytes signer
        );

        // Errors
        error InvalidSigner(bytes signer);
        error AlreadyExists(bytes signer);
        error NonexistentSigner(bytes signer);
        error UnreachableThreshold(uint128 totalWeight, uint64 threshold);
        error ZeroThreshold();
        error MismatchedLength();
        error InvalidWeight(bytes signer, uint64 weight);
        error ExpiredConfirmation(uint256 deadline);
        error InvalidConfirmationSignature(bytes signer);
        error InvalidPresignature(bytes signer);
    }

    /// EIP-712 payload a new signer signs to confirm its own addition.
    #[derive(Debug, PartialEq, Eq)]
    struct MultisigConfirmation {
        address account;
        address module;
        uint256 deadline;
    }
}

impl MultiSigSignerError {
    pub fn invalid_signer(signer: Bytes) -> Self {
        Self::InvalidSigner(IMultiSigSigner::InvalidSigner { signer })
    }

    pub fn already_exists(signer: Bytes) -> Self {
        Self::AlreadyExists(IMultiSigSigner::AlreadyExists { signer })
    }

    pub fn nonexistent_signer(signer: Bytes) -> Self {
        Self::NonexistentSigner(IMultiSigSigner::NonexistentSigner { signer })
    }

    pub const fn unreachable_threshold(total_weight: u128, threshold: u64) -> Self {
        Self::UnreachableThreshold(IMultiSigSigner::UnreachableThreshold {
            totalWeight: total_weight,
            threshold,
        })
    }

    pub const fn zero_threshold() -> Self {
        Self::ZeroThreshold(IMultiSigSigner::ZeroThreshold {})
    }

    pub const fn mismatched_length() -> Self {
        Self::MismatchedLength(IMultiSigSigner::MismatchedLength {})
    }

    pub fn invalid_weight(signer: Bytes, weight: u64) -> Self {
        Self::InvalidWeight(IMultiSigSigner::InvalidWeight { signer, weight })
    }

    pub const fn expired_confirmation(deadline: U256) -> Self {
        Self::ExpiredConfirmation(IMultiSigSigner::ExpiredConfirmation { deadline })
    }

    pub fn invalid_confirmation_signature(signer: Bytes) -> Self {
        Self::InvalidConfirmationSignature(IMultiSigSigner::InvalidConfirmationSignature { signer })
    }

    pub fn invalid_presignature(signer: Bytes) -> Self {
        Self::InvalidPresignature(IMultiSigSigner::InvalidPresignature { signer })
    }
}

impl MultiSigSignerEvent {
    pub fn signer_added(account: alloy_primitives::Address, signer: Bytes) -> Self {
        Self::ERC7913SignerAdded(IMultiSigSigner::ERC7913SignerAdded { account, signer })
    }

    pub fn signer_removed(account: alloy_primitives::Address, signer: Bytes) -> Self {
        Self::ERC7913SignerRemoved(IMultiSigSigner::ERC7913SignerRemoved { account, signer })
    }

    pub const fn threshold_set(account: alloy_primitives::Address, threshold: u64) -> Self {
        Self::ERC7913ThresholdSet(IMultiSigSigner::ERC7913ThresholdSet { account, threshold })
    }

    pub fn signer_weight_changed(
        account: alloy_primitives::Address,
        signer: Bytes,
        weight: u64,
    ) -> Self {
        Self::ERC7913SignerWeightChanged(IMultiSigSigner::ERC7913SignerWeightChanged {
            account,
            signer,
            weight,
        })
    }

    pub fn signature_presigned(
        account: alloy_primitives::Address,
        hash: alloy_primitives::B256,
        signer: Bytes,
    ) -> Self {
        Self::ERC7913SignaturePresigned(IMultiSigSigner::ERC7913SignaturePresigned {
            account,
            hash,
            signer,
        })
    }
}
