use crate::utils::error::{AppError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::OnceCell;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};

const DEFAULT_KEY: &str = "catalog_migrator_default_key_32b";
const NONCE_LEN: usize = 12;

static ENCRYPTION_KEY: OnceCell<[u8; 32]> = OnceCell::new();

fn derive_key(key_str: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let key_bytes = key_str.as_bytes();
    let len = key_bytes.len().min(32);
    key[..len].copy_from_slice(&key_bytes[..len]);
    key
}

/// 设置进程内的加密密钥，只有第一次调用生效
pub fn init_key(key_str: &str) -> bool {
    ENCRYPTION_KEY.set(derive_key(key_str)).is_ok()
}

fn cipher() -> Result<Aes256Gcm> {
    let key = ENCRYPTION_KEY.get_or_init(|| derive_key(DEFAULT_KEY));
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| AppError::Encryption(format!("Failed to create cipher: {}", e)))
}

/// 加密字符串，输出为 base64(nonce || ciphertext)
pub fn encrypt(plaintext: &str) -> Result<String> {
    let cipher = cipher()?;

    let mut rng = rand::thread_rng();
    let nonce_bytes: [u8; NONCE_LEN] = rng.r#gen();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| AppError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut result = nonce_bytes.to_vec();
    result.extend_from_slice(&ciphertext);

    Ok(general_purpose::STANDARD.encode(&result))
}

/// 解密字符串
pub fn decrypt(encrypted: &str) -> Result<String> {
    let cipher = cipher()?;

    let encrypted_data = general_purpose::STANDARD
        .decode(encrypted)
        .map_err(|e| AppError::Encryption(format!("Base64 decode failed: {}", e)))?;

    if encrypted_data.len() < NONCE_LEN {
        return Err(AppError::Encryption(
            "Invalid encrypted data: too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = encrypted_data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext_bytes = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AppError::Encryption(format!("Decryption failed: {}", e)))?;

    String::from_utf8(plaintext_bytes)
        .map_err(|e| AppError::Encryption(format!("UTF-8 decode failed: {}", e)))
}

/// 序列化为 JSON 后加密，数据源配置里有账号密码，落库前走这里
pub fn encrypt_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_string(value)?;
    encrypt(&json)
}

pub fn decrypt_json<T: DeserializeOwned>(encrypted: &str) -> Result<T> {
    let json = decrypt(encrypted)?;
    Ok(serde_json::from_str(&json)?)
}
