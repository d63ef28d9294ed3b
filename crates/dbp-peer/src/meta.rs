use crate::parser::CapabilitiesExchange;

/// Peer facts derived from an accepted capabilities exchange: the CER on
/// the server side, the CEA on the client side. Attached to the connection
/// once and read-many afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerMeta {
    pub origin_host: String,
    pub origin_realm: String,
    pub vendor_id: u32,
    pub product_name: String,
    pub origin_state_id: Option<u32>,
    /// Application ids both sides support, in advertised order.
    pub applications: Vec<u32>,
}

impl PeerMeta {
    pub fn from_ce(ce: &CapabilitiesExchange) -> Self {
        Self {
            origin_host: ce.origin_host.clone().unwrap_or_default(),
            origin_realm: ce.origin_realm.clone().unwrap_or_default(),
            vendor_id: ce.vendor_id.unwrap_or_default(),
            product_name: ce.product_name.clone().unwrap_or_default(),
            origin_state_id: ce.origin_state_id_value(),
            applications: ce.applications().to_vec(),
        }
    }
}
