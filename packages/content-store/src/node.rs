//! Store nodes.

use bytes::Bytes;

use crate::uri::StoreUri;

/// What a node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A leaf holding an opaque blob.
    Data(Bytes),
    /// An internal node; the names of its children, sorted.
    List(Vec<String>),
}

/// A snapshot of the node bound to a URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    uri: StoreUri,
    kind: NodeKind,
}

impl Node {
    pub fn data(uri: StoreUri, data: Bytes) -> Self {
        Self {
            uri,
            kind: NodeKind::Data(data),
        }
    }

    pub fn list(uri: StoreUri, mut children: Vec<String>) -> Self {
        children.sort();
        Self {
            uri,
            kind: NodeKind::List(children),
        }
    }

    pub fn uri(&self) -> &StoreUri {
        &self.uri
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, NodeKind::Data(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, NodeKind::List(_))
    }

    /// The blob of a data node.
    pub fn as_data(&self) -> Option<&Bytes> {
        match &self.kind {
            NodeKind::Data(data) => Some(data),
            NodeKind::List(_) => None,
        }
    }

    /// The child names of a list node; empty for data nodes.
    pub fn children(&self) -> &[String] {
        match &self.kind {
            NodeKind::List(children) => children,
            NodeKind::Data(_) => &[],
        }
    }

    pub fn into_data(self) -> Option<Bytes> {
        match self.kind {
            NodeKind::Data(data) => Some(data),
            NodeKind::List(_) => None,
        }
    }
}
