use alloy_primitives::FixedBytes;
use alloy_sol_types::SolCall;

crate::sol! {
    /// ERC-1271 interface implemented by contract signers
    ///
    /// A 20-byte signer identity that names a contract is verified by calling
    /// `isValidSignature` on it. Only the exact magic value counts as valid.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC1271 {
        /// @param hash The digest that was signed
        /// @param signature Opaque signature data understood by the contract
        /// @return magicValue 0x1626ba7e if valid
        function isValidSignature(
            bytes32 hash,
            bytes calldata signature
        ) external view returns (bytes4 magicValue);
    }

    /// ERC-7913 signature verifier interface
    ///
    /// Signer identities longer than 20 bytes are `verifier || key`. The
    /// verifier at `verifier` is asked to validate `signature` over `hash` for
    /// `key`, and signals success by returning its own `verify` selector.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC7913SignatureVerifier {
        /// @param key Public key material, format defined by the verifier
        /// @param hash The digest that was signed
        /// @param signature Signature data, format defined by the verifier
        /// @return magicValue IERC7913SignatureVerifier.verify.selector if valid
        function verify(
            bytes calldata key,
            bytes32 hash,
            bytes calldata signature
        ) external view returns (bytes4 magicValue);
    }

    /// WebAuthn assertion carried as the signature of a WebAuthn verifier.
    #[derive(Debug, PartialEq, Eq)]
    struct WebAuthnAuth {
        bytes authenticatorData;
        string clientDataJSON;
        uint256 challengeIndex;
        uint256 typeIndex;
        bytes32 r;
        bytes32 s;
    }
}

/// ERC-1271 magic value for valid signature
pub const ERC1271_MAGIC_VALUE: FixedBytes<4> =
    FixedBytes::new(IERC1271::isValidSignatureCall::SELECTOR);

/// Value returned by validators for an invalid ERC-1271 signature.
pub const ERC1271_INVALID_VALUE: FixedBytes<4> = FixedBytes::new([0xff; 4]);

/// ERC-7913 magic value for valid signature
pub const ERC7913_MAGIC_VALUE: FixedBytes<4> =
    FixedBytes::new(IERC7913SignatureVerifier::verifyCall::SELECTOR);

/// Value returned by ERC-7913 verifiers for a well-formed but invalid signature.
pub const ERC7913_INVALID_VALUE: FixedBytes<4> = FixedBytes::new([0xff; 4]);
