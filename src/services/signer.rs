//! 钱包账号与 SIWE 登录签名
//!
//! 私钥只在内存中以 `SigningKey` 形式存在，日志与显示一律使用脱敏地址。

use crate::error::{BotError, BotResult};
use crate::models::SignedPayload;
use crate::utils::{mask, utc_millis};
use chrono::{DateTime, Utc};
use k256::ecdsa::SigningKey;
use sha3::{Digest, Keccak256};
use std::fmt;

const SIWE_DOMAIN: &str = "app.wardenprotocol.org";
const SIWE_URI: &str = "https://app.wardenprotocol.org";
const SIWE_STATEMENT: &str = "By signing, you are proving you own this wallet and logging in. This does not initiate a transaction or cost any fees.";
const SIWE_VERSION: &str = "1";
const SIWE_CHAIN_ID: u64 = 1;
const SIWE_RESOURCE: &str = "https://privy.io";

const CHAIN_DESCRIPTOR: &str = "eip155:1";
const WALLET_CLIENT_TYPE: &str = "metamask";
const CONNECTOR_TYPE: &str = "injected";
const LOGIN_MODE: &str = "login-or-sign-up";

/// 一个钱包账号
#[derive(Clone)]
pub struct Account {
    signing_key: SigningKey,
    address: String,
}

impl Account {
    /// 从原始私钥字符串推导账号；失败时错误中只携带脱敏形式
    pub fn from_credential(raw: &str) -> BotResult<Self> {
        let raw = raw.trim();
        let hex_part = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);

        let bytes = hex::decode(hex_part).map_err(|_| BotError::InvalidCredential(mask(raw)))?;
        if bytes.len() != 32 {
            return Err(BotError::InvalidCredential(mask(raw)));
        }

        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| BotError::InvalidCredential(mask(raw)))?;
        let address = derive_address(&signing_key);

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// EIP-55 校验和格式地址
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn masked(&self) -> String {
        mask(&self.address)
    }

    /// EIP-191 personal_sign，返回 0x 前缀的 65 字节签名（v = 27/28）
    pub fn sign_personal_message(&self, message: &str) -> BotResult<String> {
        let prehash = personal_message_hash(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| BotError::Signing(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        Ok(format!("0x{}", hex::encode(bytes)))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.masked())
            .finish_non_exhaustive()
    }
}

/// 构造带签名的登录载荷（使用当前时间）
pub fn build_signed_payload(account: &Account, nonce: &str) -> BotResult<SignedPayload> {
    build_signed_payload_at(account, nonce, Utc::now())
}

/// 构造带签名的登录载荷，签发时间由调用方给定
pub fn build_signed_payload_at(
    account: &Account,
    nonce: &str,
    issued_at: DateTime<Utc>,
) -> BotResult<SignedPayload> {
    let message = siwe_message(account.address(), nonce, issued_at);
    let signature = account.sign_personal_message(&message)?;

    Ok(SignedPayload {
        message,
        signature,
        chain_id: CHAIN_DESCRIPTOR.to_string(),
        wallet_client_type: WALLET_CLIENT_TYPE.to_string(),
        connector_type: CONNECTOR_TYPE.to_string(),
        mode: LOGIN_MODE.to_string(),
    })
}

pub fn siwe_message(address: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
    format!(
        "{domain} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         {statement}\n\
         \n\
         URI: {uri}\n\
         Version: {version}\n\
         Chain ID: {chain_id}\n\
         Nonce: {nonce}\n\
         Issued At: {issued_at}\n\
         Resources:\n\
         - {resource}",
        domain = SIWE_DOMAIN,
        address = address,
        statement = SIWE_STATEMENT,
        uri = SIWE_URI,
        version = SIWE_VERSION,
        chain_id = SIWE_CHAIN_ID,
        nonce = nonce,
        issued_at = utc_millis(issued_at),
        resource = SIWE_RESOURCE,
    )
}

pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

fn derive_address(key: &SigningKey) -> String {
    let encoded = key.verifying_key().to_encoded_point(false);
    let digest = Keccak256::digest(&encoded.as_bytes()[1..]);
    to_checksum_address(&hex::encode(&digest[12..]))
}

/// EIP-55：按小写地址的 Keccak 哈希逐位决定大小写
pub fn to_checksum_address(lower_hex: &str) -> String {
    let lower = lower_hex.trim_start_matches("0x").to_ascii_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));

    let checksummed: String = lower
        .chars()
        .zip(hash.chars())
        .map(|(c, h)| {
            if c.is_ascii_alphabetic() && h.to_digit(16).unwrap_or(0) >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();

    format!("0x{}", checksummed)
}
