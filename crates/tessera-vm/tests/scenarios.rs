//! End-to-end execution scenarios for tessera-vm
//!
//! Each test installs contracts in a `MemoryRepository`, runs a transaction
//! through `Vm` and checks the resulting state.

use bytes::Bytes;
use tessera_crypto::{create2_address, create_address};
use tessera_primitives::{Address, H256, U256};
use tessera_repository::{AccountInfo, MemoryRepository, Repository};
use tessera_vm::{
    CallMessage, CreateMessage, Environment, EvmError, ExecutionResult, Prestate, Vm, VmConfig,
};

const CALLER: u64 = 0xca11;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn slot(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

fn deploy(repo: &mut MemoryRepository, address: Address, code: &[u8]) {
    repo.insert_account(address, AccountInfo::new().with_code(code.to_vec()));
}

fn storage(repo: &MemoryRepository, address: Address, key: u64) -> H256 {
    repo.get_storage_value(&address, &slot(key)).unwrap()
}

fn call_with(vm: &Vm, repo: &mut MemoryRepository, to: Address, gas: u64) -> ExecutionResult {
    init_tracing();
    let message = CallMessage {
        caller: addr(CALLER),
        to,
        value: U256::zero(),
        data: Bytes::new(),
        gas_limit: gas,
    };
    vm.call(repo, &Environment::default(), message).unwrap()
}

fn call(repo: &mut MemoryRepository, to: Address, gas: u64) -> ExecutionResult {
    call_with(&Vm::default(), repo, to, gas)
}

// ==================== Recursive storage decrement ====================

/// Decrements storage[999] and calls itself with 8/10 of its gas while the
/// value is nonzero.
const DECREMENTER: [u8; 39] = [
    0x61, 0x03, 0xe7, // PUSH2 999
    0x54, // SLOAD
    0x80, // DUP1
    0x15, // ISZERO
    0x60, 0x25, // PUSH1 end
    0x57, // JUMPI
    0x60, 0x01, // PUSH1 1
    0x90, // SWAP1
    0x03, // SUB
    0x61, 0x03, 0xe7, // PUSH2 999
    0x55, // SSTORE
    0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, // out, in, value
    0x30, // ADDRESS
    0x60, 0x0a, 0x60, 0x08, 0x5a, 0x02, 0x04, // GAS * 8 / 10
    0xf1, // CALL
    0x50, // POP
    0x5b, // end: JUMPDEST
    0x00, // STOP
];

fn decrementer_state() -> MemoryRepository {
    let json = format!(
        r#"{{
            "alloc": {{
                "{}": {{ "balance": "100000000000000000000" }},
                "0x00000000000000000000000000000000000000c0": {{
                    "code": "0x{}",
                    "storage": {{ "0x03e7": "0x03" }}
                }}
            }}
        }}"#,
        addr(CALLER).to_hex(),
        hex::encode(DECREMENTER)
    );
    let mut repo = MemoryRepository::new();
    Prestate::from_json_str(&json).unwrap().apply(&mut repo).unwrap();
    repo
}

#[test]
fn test_recursive_decrement_runs_to_zero() {
    let mut repo = decrementer_state();
    assert_eq!(
        repo.get_balance(&addr(CALLER)).unwrap(),
        U256::from_dec_str("100000000000000000000").unwrap()
    );

    let result = call(&mut repo, addr(0xc0), 1_000_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xc0), 999), H256::ZERO);
}

#[test]
fn test_recursive_decrement_is_deterministic() {
    let mut first = decrementer_state();
    let mut second = decrementer_state();
    let a = call(&mut first, addr(0xc0), 1_000_000);
    let b = call(&mut second, addr(0xc0), 1_000_000);
    assert_eq!(a, b);
    assert_eq!(first.dump(), second.dump());
}

#[test]
fn test_recursive_decrement_stops_when_gas_runs_out() {
    let mut repo = decrementer_state();
    // enough for one pass; the self-call runs out of gas and is rolled back
    let result = call(&mut repo, addr(0xc0), 10_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xc0), 999), slot(2));
    assert_eq!(result.gas_used, 9_764);
}

// ==================== Cross-contract storage write ====================

#[test]
fn test_cross_contract_storage_write() {
    let mut repo = MemoryRepository::new();
    // A: SSTORE(0, data[0]), SSTORE(1, data[1])
    deploy(
        &mut repo,
        addr(0xaa),
        &[
            0x60, 0x00, 0x35, 0x60, 0x00, 0x55, // word 0 -> key 0
            0x60, 0x20, 0x35, 0x60, 0x01, 0x55, // word 1 -> key 1
            0x00,
        ],
    );
    // B: memory = [11, 22, 33], CALL A with all 96 bytes
    deploy(
        &mut repo,
        addr(0xbb),
        &[
            0x60, 0x0b, 0x60, 0x00, 0x52, // MSTORE(0, 11)
            0x60, 0x16, 0x60, 0x20, 0x52, // MSTORE(32, 22)
            0x60, 0x21, 0x60, 0x40, 0x52, // MSTORE(64, 33)
            0x60, 0x00, 0x60, 0x00, // out 0/0
            0x60, 0x60, 0x60, 0x00, // in 0/96
            0x60, 0x00, 0x60, 0xaa, 0x5a, 0xf1, // CALL(GAS, A, 0)
            0x00,
        ],
    );

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xaa), 0), slot(11));
    assert_eq!(storage(&repo, addr(0xaa), 1), slot(22));
    assert_eq!(storage(&repo, addr(0xaa), 2), H256::ZERO);
    assert_eq!(storage(&repo, addr(0xbb), 0), H256::ZERO);
}

// ==================== Return data ====================

/// Returns 192 bytes: the words 11, 22, 33, 44, 55, 66
fn six_word_returner() -> Vec<u8> {
    let mut code = Vec::new();
    for (i, value) in [11u8, 22, 33, 44, 55, 66].iter().enumerate() {
        code.extend_from_slice(&[0x60, *value, 0x60, (i * 32) as u8, 0x52]);
    }
    code.extend_from_slice(&[0x60, 0xc0, 0x60, 0x00, 0xf3]);
    code
}

#[test]
fn test_call_return_data_copied_to_memory() {
    let mut repo = MemoryRepository::new();
    deploy(&mut repo, addr(0xaa), &six_word_returner());
    // B: CALL A with output window 32..224, then RETURN(0, 224)
    deploy(
        &mut repo,
        addr(0xbb),
        &[
            0x60, 0xc0, 0x60, 0x20, // out 32/192
            0x60, 0x00, 0x60, 0x00, // in 0/0
            0x60, 0x00, 0x60, 0xaa, 0x5a, 0xf1, // CALL(GAS, A, 0)
            0x50, // POP
            0x60, 0xe0, 0x60, 0x00, 0xf3, // RETURN(0, 224)
        ],
    );

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    let output = result.output;
    assert_eq!(output.len(), 224);
    assert!(output[..32].iter().all(|b| *b == 0));
    for (i, value) in [11u8, 22, 33, 44, 55, 66].iter().enumerate() {
        let word = &output[32 + i * 32..64 + i * 32];
        assert!(word[..31].iter().all(|b| *b == 0));
        assert_eq!(word[31], *value);
    }
}

#[test]
fn test_call_copies_at_most_window() {
    let mut repo = MemoryRepository::new();
    deploy(&mut repo, addr(0xaa), &six_word_returner());
    // B: CALL A with a 32-byte window, then store RETURNDATASIZE and MSIZE
    deploy(
        &mut repo,
        addr(0xbb),
        &[
            0x60, 0x20, 0x60, 0x00, // out 0/32
            0x60, 0x00, 0x60, 0x00, // in 0/0
            0x60, 0x00, 0x60, 0xaa, 0x5a, 0xf1, // CALL(GAS, A, 0)
            0x50, // POP
            0x3d, 0x60, 0x00, 0x55, // SSTORE(0, RETURNDATASIZE)
            0x59, 0x60, 0x01, 0x55, // SSTORE(1, MSIZE)
            0x60, 0x00, 0x51, 0x60, 0x02, 0x55, // SSTORE(2, MLOAD(0))
            0x00,
        ],
    );

    let result = call(&mut repo, addr(0xbb), 300_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xbb), 0), slot(192));
    assert_eq!(storage(&repo, addr(0xbb), 1), slot(32));
    assert_eq!(storage(&repo, addr(0xbb), 2), slot(11));
}

#[test]
fn test_revert_data_reaches_caller() {
    let mut repo = MemoryRepository::new();
    // A: SSTORE(5, 1), MSTORE(0, 42), REVERT(0, 32)
    deploy(
        &mut repo,
        addr(0xaa),
        &[
            0x60, 0x01, 0x60, 0x05, 0x55, 0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00,
            0xfd,
        ],
    );
    // B: CALL A with window 0/32, store status, RETURNDATASIZE and the copied word
    deploy(
        &mut repo,
        addr(0xbb),
        &[
            0x60, 0x20, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0xaa, 0x5a, 0xf1,
            0x60, 0x03, 0x55, // SSTORE(3, status)
            0x3d, 0x60, 0x00, 0x55, // SSTORE(0, RETURNDATASIZE)
            0x60, 0x00, 0x51, 0x60, 0x01, 0x55, // SSTORE(1, MLOAD(0))
            0x00,
        ],
    );

    let result = call(&mut repo, addr(0xbb), 300_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xbb), 3), H256::ZERO);
    assert_eq!(storage(&repo, addr(0xbb), 0), slot(32));
    assert_eq!(storage(&repo, addr(0xbb), 1), slot(42));
    assert_eq!(storage(&repo, addr(0xaa), 5), H256::ZERO);
}

// ==================== Contract creation ====================

fn creator() -> Address {
    Address::from_hex("0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap()
}

#[test]
fn test_create_address_and_nonce() {
    init_tracing();
    let mut repo = MemoryRepository::new();
    let vm = Vm::default();

    let message = CreateMessage {
        caller: creator(),
        gas_limit: 100_000,
        ..Default::default()
    };
    let result = vm.create(&mut repo, &Environment::default(), message).unwrap();
    assert!(result.is_success());
    assert_eq!(
        result.created_address,
        Some(Address::from_hex("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap())
    );
    assert_eq!(repo.get_nonce(&creator()).unwrap(), 1);

    // a failing creation still consumes the nonce exactly once
    let message = CreateMessage {
        caller: creator(),
        init_code: Bytes::from_static(&[0xfe]),
        gas_limit: 100_000,
        ..Default::default()
    };
    let result = vm.create(&mut repo, &Environment::default(), message).unwrap();
    assert_eq!(result.halt_reason(), Some(&EvmError::InvalidOpcode(0xfe)));
    assert_eq!(repo.get_nonce(&creator()).unwrap(), 2);
    let failed = Address::from_hex("0x343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap();
    assert_eq!(create_address(&creator(), 1), failed);
    assert!(!repo.account_exists(&failed).unwrap());
}

#[test]
fn test_create_opcode_from_contract() {
    let mut repo = MemoryRepository::new();
    // init code returning the single byte 0x00 (STOP), stored at memory 0
    // factory: MSTORE(0, init << 176), CREATE(0, 0, 10), SSTORE(0, address)
    let init: [u8; 10] = [0x60, 0x00, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];
    let mut factory = vec![0x69];
    factory.extend_from_slice(&init);
    factory.extend_from_slice(&[
        0x60, 0xb0, 0x1b, // SHL 176
        0x60, 0x00, 0x52, // MSTORE(0, ..)
        0x60, 0x0a, 0x60, 0x00, 0x60, 0x00, 0xf0, // CREATE(0, 0, 10)
        0x60, 0x00, 0x55, // SSTORE(0, address)
        0x00,
    ]);
    deploy(&mut repo, creator(), &factory);

    let result = call(&mut repo, creator(), 200_000);
    assert!(result.is_success());
    let created = Address::from_hex("0xcd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap();
    assert_eq!(storage(&repo, creator(), 0), H256::from_bytes(created.to_word()));
    assert_eq!(repo.get_nonce(&creator()).unwrap(), 1);
    assert_eq!(repo.get_nonce(&created).unwrap(), 1);
    assert_eq!(repo.get_code(&created).unwrap().as_ref(), &[0x00]);
}

#[test]
fn test_create_code_size_limit() {
    init_tracing();
    let mut repo = MemoryRepository::new();
    let config = VmConfig {
        max_code_size: 16,
        max_init_code_size: 64,
        ..Default::default()
    };
    let vm = Vm::new(config).unwrap();
    // RETURN(0, 17)
    let message = CreateMessage {
        caller: addr(CALLER),
        init_code: Bytes::from_static(&[0x60, 0x11, 0x60, 0x00, 0xf3]),
        gas_limit: 100_000,
        ..Default::default()
    };
    let result = vm.create(&mut repo, &Environment::default(), message).unwrap();
    assert_eq!(
        result.halt_reason(),
        Some(&EvmError::CodeSizeExceeded { size: 17, limit: 16 })
    );
    assert_eq!(result.gas_used, 100_000);
}

#[test]
fn test_create_opcode_halting_init_code() {
    let mut repo = MemoryRepository::new();
    let factory = addr(0xf0);
    // MSTORE8(0, 0xfe), CREATE(0, 0, 1), SSTORE(0, ISZERO(address))
    deploy(
        &mut repo,
        factory,
        &[
            0x60, 0xfe, 0x60, 0x00, 0x53, // init code = INVALID
            0x60, 0x01, 0x60, 0x00, 0x60, 0x00, 0xf0, // CREATE(0, 0, 1)
            0x15, 0x60, 0x00, 0x55, // SSTORE(0, ISZERO(..))
            0x00,
        ],
    );

    let result = call(&mut repo, factory, 2_000_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, factory, 0), slot(1));
    assert_eq!(repo.get_nonce(&factory).unwrap(), 1);
    assert!(!repo.account_exists(&create_address(&factory, 0)).unwrap());
}

#[test]
fn test_create_opcode_without_balance() {
    let mut repo = MemoryRepository::new();
    let factory = addr(0xf0);
    // CREATE(5, 0, 0), SSTORE(0, ISZERO(address))
    deploy(
        &mut repo,
        factory,
        &[
            0x60, 0x00, 0x60, 0x00, 0x60, 0x05, 0xf0, // CREATE(5, 0, 0)
            0x15, 0x60, 0x00, 0x55, 0x00,
        ],
    );

    let result = call(&mut repo, factory, 200_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, factory, 0), slot(1));
    // rejected before the nonce is consumed
    assert_eq!(repo.get_nonce(&factory).unwrap(), 0);
    assert!(!repo.account_exists(&create_address(&factory, 0)).unwrap());
}

#[test]
fn test_create_opcode_collision() {
    let mut repo = MemoryRepository::new();
    let factory = addr(0xf0);
    let taken = create_address(&factory, 0);
    let occupant = AccountInfo {
        nonce: 1,
        ..AccountInfo::new()
    };
    repo.insert_account(taken, occupant.clone());
    // CREATE(0, 0, 0), SSTORE(0, ISZERO(address))
    deploy(
        &mut repo,
        factory,
        &[
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0xf0, // CREATE(0, 0, 0)
            0x15, 0x60, 0x00, 0x55, 0x00,
        ],
    );

    let result = call(&mut repo, factory, 2_000_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, factory, 0), slot(1));
    assert_eq!(repo.get_nonce(&factory).unwrap(), 1);
    assert_eq!(repo.get_nonce(&taken).unwrap(), occupant.nonce);
    assert!(repo.get_code(&taken).unwrap().is_empty());
}

#[test]
fn test_create2_opcode_from_contract() {
    let mut repo = MemoryRepository::new();
    let factory = addr(0xf0);
    // init code returning the single byte 0x00
    let init: [u8; 10] = [0x60, 0x00, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3];
    let mut code = vec![0x69];
    code.extend_from_slice(&init);
    code.extend_from_slice(&[
        0x60, 0xb0, 0x1b, // SHL 176
        0x60, 0x00, 0x52, // MSTORE(0, ..)
        0x60, 0x2a, 0x60, 0x0a, 0x60, 0x00, 0x60, 0x00, 0xf5, // CREATE2(0, 0, 10, 42)
        0x60, 0x00, 0x55, // SSTORE(0, address)
        0x00,
    ]);
    deploy(&mut repo, factory, &code);

    let result = call(&mut repo, factory, 200_000);
    assert!(result.is_success());
    let created = create2_address(&factory, &slot(42), &init);
    assert_eq!(storage(&repo, factory, 0), H256::from_bytes(created.to_word()));
    assert_eq!(repo.get_nonce(&factory).unwrap(), 1);
    assert_eq!(repo.get_nonce(&created).unwrap(), 1);
    assert_eq!(repo.get_code(&created).unwrap().as_ref(), &[0x00]);
}

// ==================== Code from another account ====================

/// SSTORE(0, 0x42), SSTORE(1, CALLER), SSTORE(2, CALLVALUE)
const STORE_CALLER: [u8; 15] = [
    0x60, 0x42, 0x60, 0x00, 0x55, 0x33, 0x60, 0x01, 0x55, 0x34, 0x60, 0x02, 0x55, 0x00, 0x00,
];

#[test]
fn test_delegatecall_uses_caller_storage() {
    let mut repo = MemoryRepository::new();
    deploy(&mut repo, addr(0xaa), &STORE_CALLER);
    // B: DELEGATECALL(GAS, A, no input, no output)
    deploy(
        &mut repo,
        addr(0xbb),
        &[0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0xaa, 0x5a, 0xf4, 0x00],
    );

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xbb), 0), slot(0x42));
    // the original caller and value are kept
    assert_eq!(storage(&repo, addr(0xbb), 1), slot(CALLER));
    assert_eq!(storage(&repo, addr(0xbb), 2), H256::ZERO);
    assert_eq!(storage(&repo, addr(0xaa), 0), H256::ZERO);
}

#[test]
fn test_callcode_uses_caller_storage() {
    let mut repo = MemoryRepository::new();
    deploy(&mut repo, addr(0xaa), &STORE_CALLER);
    repo.insert_account(
        addr(0xbb),
        AccountInfo::new().with_balance(U256::from(1_000u64)).with_code(vec![
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, // no input or output
            0x60, 0x07, 0x60, 0xaa, 0x5a, 0xf2, // CALLCODE(GAS, A, 7)
            0x00,
        ]),
    );

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xbb), 0), slot(0x42));
    // B itself is the caller and the value stays with B
    assert_eq!(storage(&repo, addr(0xbb), 1), slot(0xbb));
    assert_eq!(storage(&repo, addr(0xbb), 2), slot(7));
    assert_eq!(repo.get_balance(&addr(0xbb)).unwrap(), U256::from(1_000u64));
    assert_eq!(storage(&repo, addr(0xaa), 0), H256::ZERO);
}

// ==================== Limits and protection ====================

#[test]
fn test_call_depth_limit() {
    let mut repo = MemoryRepository::new();
    // SSTORE(0, SLOAD(0) + 1), CALL(GAS, ADDRESS, 0), STOP
    deploy(
        &mut repo,
        addr(0xaa),
        &[
            0x60, 0x00, 0x54, 0x60, 0x01, 0x01, 0x60, 0x00, 0x55, // counter++
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x30, 0x5a, 0xf1,
            0x00,
        ],
    );
    let config = VmConfig {
        max_call_depth: 8,
        ..Default::default()
    };
    let vm = Vm::new(config).unwrap();

    let result = call_with(&vm, &mut repo, addr(0xaa), 10_000_000);
    assert!(result.is_success());
    // frames at depths 0 through 8 each increment once
    assert_eq!(storage(&repo, addr(0xaa), 0), slot(9));
    assert_eq!(repo.tracking_depth(), 0);
}

#[test]
fn test_staticcall_blocks_writes() {
    let mut repo = MemoryRepository::new();
    // A: SSTORE(0, 1)
    deploy(&mut repo, addr(0xaa), &[0x60, 0x01, 0x60, 0x00, 0x55, 0x00]);
    // B: STATICCALL(0xffff, A), SSTORE(0, ISZERO(status))
    // the halted child burns its 0xffff, leaving B enough for the SSTORE
    deploy(
        &mut repo,
        addr(0xbb),
        &[
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0xaa, 0x61, 0xff, 0xff, 0xfa,
            0x15, 0x60, 0x00, 0x55, 0x00,
        ],
    );

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    assert_eq!(storage(&repo, addr(0xbb), 0), slot(1));
    assert_eq!(storage(&repo, addr(0xaa), 0), H256::ZERO);
}

#[test]
fn test_logs_dropped_with_reverted_child() {
    let mut repo = MemoryRepository::new();
    // A: LOG0(0, 0), REVERT(0, 0)
    deploy(
        &mut repo,
        addr(0xaa),
        &[0x60, 0x00, 0x60, 0x00, 0xa0, 0x60, 0x00, 0x60, 0x00, 0xfd],
    );
    // C: LOG0(0, 0), STOP
    deploy(&mut repo, addr(0xcc), &[0x60, 0x00, 0x60, 0x00, 0xa0, 0x00]);
    // B: CALL A, CALL C
    let mut code = Vec::new();
    for target in [0xaa, 0xcc] {
        code.extend_from_slice(&[
            0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, 0x00, 0x60, target, 0x5a, 0xf1,
            0x50,
        ]);
    }
    deploy(&mut repo, addr(0xbb), &code);

    let result = call(&mut repo, addr(0xbb), 200_000);
    assert!(result.is_success());
    assert_eq!(result.logs.len(), 1);
    assert_eq!(result.logs[0].address, addr(0xcc));
}
