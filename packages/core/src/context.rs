use std::collections::HashMap;

/// Per-request context carrying the correlation id and caller identity.
/// Derived once from the decoded wire envelope and threaded through the
/// router and the backend connector for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Opaque token linking this request to its reply. Never empty; falls
    /// back to `"unknown"` when the request carries no id anywhere.
    pub correlation_id: String,
    /// Caller session, echoed back in the reply context.
    pub session_id: Option<String>,
    /// Identifier of the consuming application, if supplied.
    pub consumer_id: Option<String>,
    /// User id from the nested auth info, if supplied.
    pub user_id: Option<String>,
    /// Username from the nested auth info, if supplied.
    pub username: Option<String>,
    /// Free-form key/value context, flattened from the wire list.
    pub general_context: HashMap<String, String>,
}

impl CallContext {
    /// Flattens an ordered key/value entry list into a map.
    /// Duplicate keys resolve last-write-wins, matching wire order.
    #[must_use]
    pub fn flatten_entries<I, K, V>(entries: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = HashMap::new();
        for (key, value) in entries {
            map.insert(key.into(), value.into());
        }
        map
    }
}
