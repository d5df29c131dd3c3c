//! Account flows spanning several modules.

use std::{rc::Rc, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::SolValue;
use tempo_account_contracts::precompiles::{
    DelayedExecutorError, ModuleError, RecoveryGuardianError,
};
use tempo_account_modules::{
    DelayedExecutor, Erc7579Module, MODULE_TYPE_EXECUTOR, ModuleConfig, MultiSigSigner,
    MultisigGated, OperationRequest, OperationState, P256Verifier, RecoveryGuardian,
    RecoveryStatus, SelectorRestricted, SignerRegistry, WebAuthnVerifier, Weighted,
    config::DAY,
    signature::{GuardianSignatures, MultisigSignature},
    storage::{StorageCtx, hashmap::HashMapStorageProvider},
    test_util::{EcdsaKey, MockAccount, P256Key},
};

const ACCOUNT: Address = Address::repeat_byte(0xac);
const SIGNER_MODULE: Address = Address::repeat_byte(0x4d);
const RECOVERY_MODULE: Address = Address::repeat_byte(0x7e);
const EXECUTOR_MODULE: Address = Address::repeat_byte(0xde);
const P256_VERIFIER: Address = Address::repeat_byte(0x25);
const WEBAUTHN_VERIFIER: Address = Address::repeat_byte(0x26);
const START: u64 = 1_700_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn guardian_approvals(keys: &[&EcdsaKey], digest: B256) -> Bytes {
    GuardianSignatures::from_pairs(keys.iter().map(|key| (key.identity(), key.sign(digest))))
        .encode()
}

#[test]
fn guardian_recovery_with_timelock() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let keys = [EcdsaKey::random(), EcdsaKey::random(), EcdsaKey::random()];
        let identities: Vec<Bytes> = keys.iter().map(EcdsaKey::identity).collect();
        let guardian = RecoveryGuardian::new(
            RECOVERY_MODULE,
            Arc::new(SignerRegistry::new()),
            ModuleConfig::default().recovery_guardian,
        );
        guardian.on_install(ACCOUNT, &(identities, 2u64, DAY).abi_encode_params())?;

        let account = MockAccount::new();
        account.install(ACCOUNT, MODULE_TYPE_EXECUTOR, RECOVERY_MODULE);

        let payload = Bytes::from_static(b"replace owner");
        let digest = guardian.start_recovery_digest(ACCOUNT, keccak256(&payload))?;

        // One approval is not enough.
        assert_eq!(
            guardian.start_recovery(ACCOUNT, &guardian_approvals(&[&keys[0]], digest), &payload),
            Err(RecoveryGuardianError::threshold_not_met(1, 2).into())
        );

        let approvals = guardian_approvals(&[&keys[0], &keys[2]], digest);
        guardian.start_recovery(ACCOUNT, &approvals, &payload)?;
        assert_eq!(guardian.recovery_status(ACCOUNT)?, RecoveryStatus::Started);

        StorageCtx.advance_time(DAY - 1);
        assert!(guardian.execute_recovery(ACCOUNT, &payload, &account).is_err());

        StorageCtx.advance_time(1);
        assert_eq!(guardian.recovery_status(ACCOUNT)?, RecoveryStatus::Ready);
        // Anyone can trigger the execution.
        guardian.execute_recovery(ACCOUNT, &payload, &account)?;
        assert_eq!(account.executions().len(), 1);
        assert_eq!(account.executions()[0].account, ACCOUNT);
        assert_eq!(account.executions()[0].payload, payload);

        // The approvals were bound to the previous nonce.
        assert_eq!(
            guardian.start_recovery(ACCOUNT, &approvals, &payload),
            Err(RecoveryGuardianError::invalid_guardian_signature().into())
        );
        assert_eq!(guardian.recovery_status(ACCOUNT)?, RecoveryStatus::NotStarted);
        Ok(())
    })
}

#[test]
fn recovery_requires_executor_installation() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let key = EcdsaKey::random();
        let guardian = RecoveryGuardian::new(
            RECOVERY_MODULE,
            Arc::new(SignerRegistry::new()),
            ModuleConfig::default().recovery_guardian,
        );
        guardian.on_install(ACCOUNT, &(vec![key.identity()], 1u64, DAY).abi_encode_params())?;

        let payload = Bytes::from_static(b"replace owner");
        let digest = guardian.start_recovery_digest(ACCOUNT, keccak256(&payload))?;
        guardian.start_recovery(ACCOUNT, &guardian_approvals(&[&key], digest), &payload)?;
        StorageCtx.advance_time(DAY);

        let account = MockAccount::new();
        assert_eq!(
            guardian.execute_recovery(ACCOUNT, &payload, &account),
            Err(ModuleError::module_not_installed(ACCOUNT).into())
        );
        assert_eq!(guardian.recovery_status(ACCOUNT)?, RecoveryStatus::Ready);

        account.install(ACCOUNT, MODULE_TYPE_EXECUTOR, RECOVERY_MODULE);
        guardian.execute_recovery(ACCOUNT, &payload, &account)?;
        Ok(())
    })
}

#[test]
fn weighted_signers_reach_threshold() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1);
    StorageCtx::enter(&mut storage, || {
        let [a, b, c] = [EcdsaKey::random(), EcdsaKey::random(), EcdsaKey::random()];
        let identities = vec![a.identity(), b.identity(), c.identity()];
        let signer =
            MultiSigSigner::<Weighted>::new(SIGNER_MODULE, Arc::new(SignerRegistry::new()));
        signer.on_install(ACCOUNT, &(identities, vec![5u64, 3, 2], 6u64).abi_encode_params())?;
        assert_eq!(signer.total_weight(ACCOUNT), 10);

        let hash = B256::repeat_byte(0x42);
        let sign = |keys: &[&EcdsaKey]| {
            MultisigSignature::from_pairs(keys.iter().map(|key| (key.identity(), key.sign(hash))))
                .encode()
        };

        assert!(signer.is_valid_signature(ACCOUNT, hash, &sign(&[&a, &b])));
        assert!(signer.is_valid_signature(ACCOUNT, hash, &sign(&[&a, &c])));
        assert!(!signer.is_valid_signature(ACCOUNT, hash, &sign(&[&b, &c])));
        assert!(!signer.is_valid_signature(ACCOUNT, hash, &sign(&[&a])));

        assert_eq!(signer.validate_user_op(ACCOUNT, hash, &sign(&[&a, &b])), U256::ZERO);
        assert_eq!(signer.validate_user_op(ACCOUNT, hash, &sign(&[&b, &c])), U256::from(1));
        Ok(())
    })
}

#[test]
fn passkey_signers_in_a_multisig() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1);
    StorageCtx::enter(&mut storage, || {
        let registry = SignerRegistry::new()
            .with_verifier(P256_VERIFIER, P256Verifier)
            .with_verifier(WEBAUTHN_VERIFIER, WebAuthnVerifier);
        let ecdsa = EcdsaKey::random();
        let p256 = P256Key::from_seed(1);
        let passkey = P256Key::from_seed(2);
        let identities = vec![
            ecdsa.identity(),
            p256.identity(P256_VERIFIER),
            passkey.identity(WEBAUTHN_VERIFIER),
        ];

        let signer: MultiSigSigner = MultiSigSigner::new(SIGNER_MODULE, Arc::new(registry));
        signer.on_install(ACCOUNT, &(identities.clone(), 3u64).abi_encode_params())?;

        let hash = B256::repeat_byte(0x17);
        let signature = MultisigSignature::from_pairs([
            (identities[0].clone(), ecdsa.sign(hash)),
            (identities[1].clone(), p256.sign(hash)),
            (identities[2].clone(), passkey.sign_webauthn(hash)),
        ]);
        assert!(signer.is_valid_signature(ACCOUNT, hash, &signature.encode()));

        // A raw P256 signature is not a valid WebAuthn assertion.
        let signature = MultisigSignature::from_pairs([
            (identities[0].clone(), ecdsa.sign(hash)),
            (identities[1].clone(), p256.sign(hash)),
            (identities[2].clone(), passkey.sign(hash)),
        ]);
        assert!(!signer.is_valid_signature(ACCOUNT, hash, &signature.encode()));
        Ok(())
    })
}

#[test]
fn multisig_gated_scheduling() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let keys = [EcdsaKey::random(), EcdsaKey::random()];
        let identities: Vec<Bytes> = keys.iter().map(EcdsaKey::identity).collect();
        let signers: Rc<MultiSigSigner> =
            Rc::new(MultiSigSigner::new(SIGNER_MODULE, Arc::new(SignerRegistry::new())));
        signers.on_install(ACCOUNT, &(identities, 2u64).abi_encode_params())?;

        let executor = DelayedExecutor::new(
            EXECUTOR_MODULE,
            ModuleConfig::default().delayed_executor,
            MultisigGated::new(Rc::clone(&signers)),
        );
        executor.on_install(ACCOUNT, &(DAY, 7 * DAY).abi_encode_params())?;

        let relayer = Address::repeat_byte(0x01);
        let op = OperationRequest::new(ACCOUNT, B256::ZERO, Bytes::from_static(b"pay"), B256::ZERO);
        let id = op.operation_id();
        let sign = |keys: &[&EcdsaKey]| {
            MultisigSignature::from_pairs(keys.iter().map(|key| (key.identity(), key.sign(id))))
                .encode()
        };

        assert_eq!(
            executor.schedule(relayer, &op, &sign(&[&keys[0]])),
            Err(DelayedExecutorError::invalid_multisig_authorization(id).into())
        );
        executor.schedule(relayer, &op, &sign(&[&keys[0], &keys[1]]))?;
        assert_eq!(executor.state(ACCOUNT, id)?, OperationState::Scheduled);

        // Cancellation stays with the account.
        assert_eq!(
            executor.cancel(relayer, &op),
            Err(ModuleError::unauthorized_caller(relayer).into())
        );

        let account = MockAccount::new();
        StorageCtx.advance_time(DAY);
        executor.execute(relayer, &op, &account)?;
        assert_eq!(executor.state(ACCOUNT, id)?, OperationState::Executed);
        assert_eq!(executor.policy().signers().threshold(ACCOUNT), 2);
        Ok(())
    })
}

#[test]
fn selector_restricted_scheduling() -> eyre::Result<()> {
    init_tracing();
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let executor = DelayedExecutor::new(
            EXECUTOR_MODULE,
            ModuleConfig::default().delayed_executor,
            SelectorRestricted::default(),
        );
        executor.on_install(ACCOUNT, &(0u64, 2 * DAY).abi_encode_params())?;

        let approve = alloy_primitives::fixed_bytes!("0x095ea7b3");
        let op = OperationRequest::new(
            ACCOUNT,
            B256::ZERO,
            Bytes::from([approve.as_slice(), &[0u8; 64]].concat()),
            B256::ZERO,
        );
        assert_eq!(
            executor.schedule(ACCOUNT, &op, &[]),
            Err(DelayedExecutorError::unauthorized_selector(ACCOUNT, approve).into())
        );

        executor.add_selectors(ACCOUNT, &[approve])?;
        let id = executor.schedule(ACCOUNT, &op, &[])?;
        assert_eq!(executor.schedule_of(ACCOUNT, id).map(|s| s.delay), Some(DAY));
        Ok(())
    })
}

#[test]
fn executor_honors_toml_config() -> eyre::Result<()> {
    init_tracing();
    let config = ModuleConfig::from_toml_str(
        r#"
        [delayed_executor]
        min_delay = 60
        min_expiration = 600
        min_setback = 0
        cancel_expired_operations = false
        "#,
    )?;
    assert_eq!(config.recovery_guardian, Default::default());

    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let executor = DelayedExecutor::new(
            EXECUTOR_MODULE,
            config.delayed_executor.clone(),
            tempo_account_modules::AccountOnly,
        );
        executor.on_install(ACCOUNT, &(1u64, 1u64).abi_encode_params())?;
        assert_eq!(executor.delay(ACCOUNT)?, 60);
        assert_eq!(executor.expiration(ACCOUNT)?, 600);

        let op = OperationRequest::new(ACCOUNT, B256::ZERO, Bytes::new(), B256::ZERO);
        let id = executor.schedule(ACCOUNT, &op, &[])?;
        StorageCtx.advance_time(600);
        assert_eq!(executor.state(ACCOUNT, id)?, OperationState::Expired);
        assert_eq!(
            executor.cancel(ACCOUNT, &op),
            Err(DelayedExecutorError::operation_not_cancelable(id).into())
        );
        Ok(())
    })
}
