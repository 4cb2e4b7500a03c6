// src/script.rs - Neo VM script construction for contract invocations
use crate::wallet::ScriptHash;

// Opcodes used by the builder (Neo VM 3.x).
const OP_PUSHINT8: u8 = 0x00;
const OP_PUSHINT16: u8 = 0x01;
const OP_PUSHINT32: u8 = 0x02;
const OP_PUSHINT64: u8 = 0x03;
const OP_PUSHT: u8 = 0x08;
const OP_PUSHF: u8 = 0x09;
const OP_PUSHDATA1: u8 = 0x0C;
const OP_PUSHDATA2: u8 = 0x0D;
const OP_PUSHDATA4: u8 = 0x0E;
const OP_PUSHM1: u8 = 0x0F;
const OP_PUSH0: u8 = 0x10;
const OP_SYSCALL: u8 = 0x41;
const OP_PACK: u8 = 0xC0;
const OP_NEWARRAY0: u8 = 0xC2;

/// Interop hash of System.Contract.Call.
const CONTRACT_CALL_INTEROP: [u8; 4] = [0x62, 0x7d, 0x5b, 0x52];

/// Call permission flags attached to a dynamic contract call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFlags {
    None,
    ReadOnly,
    All,
}

impl CallFlags {
    fn bits(self) -> i64 {
        match self {
            CallFlags::None => 0x00,
            CallFlags::ReadOnly => 0x05,
            CallFlags::All => 0x0F,
        }
    }
}

/// A typed argument for a contract invocation.
#[derive(Debug, Clone)]
pub enum ContractParameter {
    Bool(bool),
    Int(i64),
    String(String),
    ByteArray(Vec<u8>),
    Hash160(ScriptHash),
    Array(Vec<ContractParameter>),
}

impl ContractParameter {
    pub fn string(value: impl Into<String>) -> Self {
        ContractParameter::String(value.into())
    }

    pub fn int_array(values: &[i64]) -> Self {
        ContractParameter::Array(values.iter().map(|v| ContractParameter::Int(*v)).collect())
    }

    pub fn string_array(values: &[String]) -> Self {
        ContractParameter::Array(
            values
                .iter()
                .map(|v| ContractParameter::String(v.clone()))
                .collect(),
        )
    }
}

/// Incremental Neo VM script writer.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.script
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.script.push(if value { OP_PUSHT } else { OP_PUSHF });
        self
    }

    /// Push a signed integer using the smallest encoding the VM accepts.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        if value == -1 {
            self.script.push(OP_PUSHM1);
        } else if (0..=16).contains(&value) {
            self.script.push(OP_PUSH0 + value as u8);
        } else if let Ok(v) = i8::try_from(value) {
            self.script.push(OP_PUSHINT8);
            self.script.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i16::try_from(value) {
            self.script.push(OP_PUSHINT16);
            self.script.extend_from_slice(&v.to_le_bytes());
        } else if let Ok(v) = i32::try_from(value) {
            self.script.push(OP_PUSHINT32);
            self.script.extend_from_slice(&v.to_le_bytes());
        } else {
            self.script.push(OP_PUSHINT64);
            self.script.extend_from_slice(&value.to_le_bytes());
        }
        self
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.len() < 0x100 {
            self.script.push(OP_PUSHDATA1);
            self.script.push(data.len() as u8);
        } else if data.len() < 0x1_0000 {
            self.script.push(OP_PUSHDATA2);
            self.script
                .extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            self.script.push(OP_PUSHDATA4);
            self.script
                .extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        self.script.extend_from_slice(data);
        self
    }

    pub fn push_string(&mut self, value: &str) -> &mut Self {
        self.push_bytes(value.as_bytes())
    }

    pub fn push_param(&mut self, param: &ContractParameter) -> &mut Self {
        match param {
            ContractParameter::Bool(v) => self.push_bool(*v),
            ContractParameter::Int(v) => self.push_int(*v),
            ContractParameter::String(v) => self.push_string(v),
            ContractParameter::ByteArray(v) => self.push_bytes(v),
            ContractParameter::Hash160(v) => self.push_bytes(&v.0),
            ContractParameter::Array(items) => self.push_array(items),
        }
    }

    /// Push an array value: items in reverse, count, PACK.
    pub fn push_array(&mut self, items: &[ContractParameter]) -> &mut Self {
        if items.is_empty() {
            self.script.push(OP_NEWARRAY0);
            return self;
        }
        for item in items.iter().rev() {
            self.push_param(item);
        }
        self.push_int(items.len() as i64);
        self.script.push(OP_PACK);
        self
    }

    pub fn syscall(&mut self, interop: [u8; 4]) -> &mut Self {
        self.script.push(OP_SYSCALL);
        self.script.extend_from_slice(&interop);
        self
    }

    /// Emit a dynamic call: args array, call flags, method, contract hash,
    /// SYSCALL System.Contract.Call.
    pub fn contract_call(
        &mut self,
        contract: ScriptHash,
        method: &str,
        args: &[ContractParameter],
        flags: CallFlags,
    ) -> &mut Self {
        self.push_array(args);
        self.push_int(flags.bits());
        self.push_string(method);
        self.push_bytes(&contract.0);
        self.syscall(CONTRACT_CALL_INTEROP)
    }
}

/// Build the `updatePriceBatch(symbols, prices, timestamps, confidences)`
/// invocation script. The four slices must be index-aligned.
pub fn update_price_batch_script(
    oracle_contract: ScriptHash,
    symbols: &[String],
    prices: &[i64],
    timestamps: &[i64],
    confidences: &[i64],
) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.contract_call(
        oracle_contract,
        "updatePriceBatch",
        &[
            ContractParameter::string_array(symbols),
            ContractParameter::int_array(prices),
            ContractParameter::int_array(timestamps),
            ContractParameter::int_array(confidences),
        ],
        CallFlags::All,
    );
    builder.into_bytes()
}

/// Build a NEP-17 `transfer(from, to, amount, data)` invocation script.
pub fn nep17_transfer_script(
    token: ScriptHash,
    from: ScriptHash,
    to: ScriptHash,
    amount: i64,
    data: &str,
) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.contract_call(
        token,
        "transfer",
        &[
            ContractParameter::Hash160(from),
            ContractParameter::Hash160(to),
            ContractParameter::Int(amount),
            ContractParameter::string(data),
        ],
        CallFlags::All,
    );
    builder.into_bytes()
}

/// Build a read-only single-method invocation, used by the contract query
/// helpers and health checks.
pub fn contract_read_script(
    contract: ScriptHash,
    method: &str,
    args: &[ContractParameter],
) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.contract_call(contract, method, args, CallFlags::ReadOnly);
    builder.into_bytes()
}
