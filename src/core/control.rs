//! In-band control tokens.
//!
//! Tokens travel raw on the same channel as envelopes. None of them can be confused
//! with an envelope because the marker's first byte is not printable ASCII.

/// Control token exchanged outside of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    /// Requests or confirms an orderly shutdown.
    Exit,
    /// Heartbeat probe sent by output-direction servers.
    Beat,
    /// Reply to [`ControlToken::Beat`].
    Ack,
}

/// Result of matching pending bytes against the known tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMatch {
    /// The bytes start with a complete token.
    Full(ControlToken),
    /// The bytes are a strict prefix of a token; more data is needed.
    Partial,
    /// The bytes are not a token.
    None,
}

impl ControlToken {
    pub const ALL: [ControlToken; 3] = [ControlToken::Exit, ControlToken::Beat, ControlToken::Ack];

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            ControlToken::Exit => b"exit",
            ControlToken::Beat => b"beat",
            ControlToken::Ack => b"ack",
        }
    }

    pub fn wire_len(self) -> usize {
        self.as_bytes().len()
    }

    /// Classify the start of `pending`.
    pub fn match_prefix(pending: &[u8]) -> TokenMatch {
        if pending.is_empty() {
            return TokenMatch::None;
        }
        let mut partial = false;
        for token in Self::ALL {
            let bytes = token.as_bytes();
            if pending.len() >= bytes.len() {
                if &pending[..bytes.len()] == bytes {
                    return TokenMatch::Full(token);
                }
            } else if bytes.starts_with(pending) {
                partial = true;
            }
        }
        if partial {
            TokenMatch::Partial
        } else {
            TokenMatch::None
        }
    }

    /// Exact match, used for datagrams where one token fills the whole payload.
    pub fn from_exact(bytes: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_bytes() == bytes)
    }
}
