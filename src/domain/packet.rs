//! Bus packet codec.
//!
//! Every packet on the bus channel starts with a one-byte tag:
//!
//! ```text
//! 0x00 | payload                      broadcast to every connection
//! 0x01 | user id (be32) | payload     deliver to one user's connections
//! 0x02 | token                        authentication failed
//! 0x03 | user id (be32) | token       authentication succeeded
//! 0x80 | token                        authentication request (outbound)
//! ```

use super::foundation::{CorrelationToken, PacketError, UserId};

/// Packet type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketTag {
    Broadcast = 0x00,
    Targeted = 0x01,
    AuthFailure = 0x02,
    AuthSuccess = 0x03,
    AuthRequest = 0x80,
}

impl PacketTag {
    /// Label used for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketTag::Broadcast => "broadcast",
            PacketTag::Targeted => "targeted",
            PacketTag::AuthFailure => "auth_failure",
            PacketTag::AuthSuccess => "auth_success",
            PacketTag::AuthRequest => "auth_request",
        }
    }
}

impl TryFrom<u8> for PacketTag {
    type Error = PacketError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0x00 => Ok(PacketTag::Broadcast),
            0x01 => Ok(PacketTag::Targeted),
            0x02 => Ok(PacketTag::AuthFailure),
            0x03 => Ok(PacketTag::AuthSuccess),
            0x80 => Ok(PacketTag::AuthRequest),
            other => Err(PacketError::UnknownTag(other)),
        }
    }
}

/// A decoded bus packet. Payloads borrow from the raw packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Broadcast { payload: &'a [u8] },
    Targeted { user_id: UserId, payload: &'a [u8] },
    AuthFailure { token: CorrelationToken },
    AuthSuccess { user_id: UserId, token: CorrelationToken },
    AuthRequest { token: CorrelationToken },
}

impl<'a> Packet<'a> {
    /// Decodes a raw bus packet.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, PacketError> {
        let (&tag_byte, body) = bytes.split_first().ok_or(PacketError::Empty)?;
        let tag = PacketTag::try_from(tag_byte)?;

        match tag {
            PacketTag::Broadcast => Ok(Packet::Broadcast { payload: body }),
            PacketTag::Targeted => {
                let (user_id, payload) = split_user_id(tag_byte, body)?;
                Ok(Packet::Targeted { user_id, payload })
            }
            PacketTag::AuthFailure => Ok(Packet::AuthFailure {
                token: CorrelationToken::from(body),
            }),
            PacketTag::AuthSuccess => {
                let (user_id, token) = split_user_id(tag_byte, body)?;
                Ok(Packet::AuthSuccess {
                    user_id,
                    token: CorrelationToken::from(token),
                })
            }
            PacketTag::AuthRequest => Ok(Packet::AuthRequest {
                token: CorrelationToken::from(body),
            }),
        }
    }

    /// Returns the tag this packet was decoded from.
    pub fn tag(&self) -> PacketTag {
        match self {
            Packet::Broadcast { .. } => PacketTag::Broadcast,
            Packet::Targeted { .. } => PacketTag::Targeted,
            Packet::AuthFailure { .. } => PacketTag::AuthFailure,
            Packet::AuthSuccess { .. } => PacketTag::AuthSuccess,
            Packet::AuthRequest { .. } => PacketTag::AuthRequest,
        }
    }

    /// Encodes the packet into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Broadcast { payload } => tagged(PacketTag::Broadcast, &[payload]),
            Packet::Targeted { user_id, payload } => {
                tagged(PacketTag::Targeted, &[&user_id.to_be_bytes(), payload])
            }
            Packet::AuthFailure { token } => tagged(PacketTag::AuthFailure, &[token.as_bytes()]),
            Packet::AuthSuccess { user_id, token } => tagged(
                PacketTag::AuthSuccess,
                &[&user_id.to_be_bytes(), token.as_bytes()],
            ),
            Packet::AuthRequest { token } => tagged(PacketTag::AuthRequest, &[token.as_bytes()]),
        }
    }
}

/// Builds the outbound authentication request for a submitted token.
pub fn auth_request(token: &CorrelationToken) -> Vec<u8> {
    Packet::AuthRequest {
        token: token.clone(),
    }
    .encode()
}

fn split_user_id(tag: u8, body: &[u8]) -> Result<(UserId, &[u8]), PacketError> {
    if body.len() < 4 {
        return Err(PacketError::Truncated {
            tag,
            needed: 5,
            actual: body.len() + 1,
        });
    }
    let (id, rest) = body.split_at(4);
    Ok((UserId::from_be_bytes([id[0], id[1], id[2], id[3]]), rest))
}

fn tagged(tag: PacketTag, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut out = Vec::with_capacity(len);
    out.push(tag as u8);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}
