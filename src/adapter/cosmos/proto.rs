//! Cosmos SDK transaction messages (bank send, direct sign mode)

use prost::Message;
use sha2::{Digest, Sha256};

pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";
pub const SIGN_MODE_DIRECT: i32 = 1;

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    /// Integer amount as a decimal string.
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSend {
    #[prost(string, tag = "1")]
    pub from_address: String,
    #[prost(string, tag = "2")]
    pub to_address: String,
    #[prost(message, repeated, tag = "3")]
    pub amount: Vec<Coin>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ModeInfoSingle {
    #[prost(int32, tag = "1")]
    pub mode: i32,
}

/// Only the `single` arm of the `sum` oneof; encodes identically.
#[derive(Clone, PartialEq, Message)]
pub struct ModeInfo {
    #[prost(message, optional, tag = "1")]
    pub single: Option<ModeInfoSingle>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(message, optional, tag = "2")]
    pub mode_info: Option<ModeInfo>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignDoc {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub account_number: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

/// Inputs for a single-signer bank send.
#[derive(Debug, Clone)]
pub struct SendDoc<'a> {
    pub chain_id: &'a str,
    pub account_number: u64,
    pub sequence: u64,
    pub public_key: &'a [u8; 33],
    pub from: &'a str,
    pub to: &'a str,
    pub denom: &'a str,
    pub amount: u128,
    pub fee: u128,
    pub gas_limit: u64,
    pub memo: &'a str,
}

impl SendDoc<'_> {
    pub fn to_sign_doc(&self) -> SignDoc {
        let send = MsgSend {
            from_address: self.from.to_string(),
            to_address: self.to.to_string(),
            amount: vec![Coin {
                denom: self.denom.to_string(),
                amount: self.amount.to_string(),
            }],
        };
        let body = TxBody {
            messages: vec![Any {
                type_url: MSG_SEND_TYPE_URL.to_string(),
                value: send.encode_to_vec(),
            }],
            memo: self.memo.to_string(),
            timeout_height: 0,
        };
        let auth_info = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(Any {
                    type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
                    value: PubKey {
                        key: self.public_key.to_vec(),
                    }
                    .encode_to_vec(),
                }),
                mode_info: Some(ModeInfo {
                    single: Some(ModeInfoSingle {
                        mode: SIGN_MODE_DIRECT,
                    }),
                }),
                sequence: self.sequence,
            }],
            fee: Some(Fee {
                amount: vec![Coin {
                    denom: self.denom.to_string(),
                    amount: self.fee.to_string(),
                }],
                gas_limit: self.gas_limit,
                payer: String::new(),
                granter: String::new(),
            }),
        };
        SignDoc {
            body_bytes: body.encode_to_vec(),
            auth_info_bytes: auth_info.encode_to_vec(),
            chain_id: self.chain_id.to_string(),
            account_number: self.account_number,
        }
    }
}

impl SignDoc {
    /// SHA-256 of the encoded document; what the device signs.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.encode_to_vec()).into()
    }

    /// Compressed key of the first signer, if present.
    pub fn signer_public_key(&self) -> Option<[u8; 33]> {
        let auth_info = AuthInfo::decode(self.auth_info_bytes.as_slice()).ok()?;
        let any = auth_info.signer_infos.first()?.public_key.as_ref()?;
        if any.type_url != SECP256K1_PUBKEY_TYPE_URL {
            return None;
        }
        let key = PubKey::decode(any.value.as_slice()).ok()?;
        key.key.try_into().ok()
    }

    pub fn into_tx_raw(self, signature: Vec<u8>) -> TxRaw {
        TxRaw {
            body_bytes: self.body_bytes,
            auth_info_bytes: self.auth_info_bytes,
            signatures: vec![signature],
        }
    }
}
