//! Client order ids of the form `<tag>-<order id>`.
//!
//! The tag tells this engine's orders apart from anything else placed on the
//! same account.

use crate::ConnectorError;
use common::{is_client_id_tag, CLIENT_ID_TAG_LEN};
use model::OrderId;

/// Maps internal order ids to the client order ids the exchange sees.
///
/// The wire form is `<tag>-<id>`, where the tag is twelve word characters
/// shared by every order this deployment places. Ids carrying any other tag
/// belong to someone else and decode to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdCodec {
    tag: String,
}

impl ClientIdCodec {
    pub fn new(tag: impl Into<String>) -> Result<Self, ConnectorError> {
        let tag = tag.into();
        if !is_client_id_tag(&tag) {
            return Err(ConnectorError::InvalidClientIdTag(tag));
        }
        Ok(Self { tag })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn encode(&self, id: OrderId) -> String {
        format!("{}-{}", self.tag, id)
    }

    pub fn decode(&self, client_id: &str) -> Option<OrderId> {
        let (tag, digits) = client_id.split_at_checked(CLIENT_ID_TAG_LEN)?;
        let digits = digits.strip_prefix('-')?;
        if tag != self.tag || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i64>().ok().map(OrderId)
    }
}
