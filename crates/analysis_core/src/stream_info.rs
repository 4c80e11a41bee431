use serde::Serialize;

/// One row of the stream-info tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InfoNode {
    pub label: String,
    pub value: String,
    pub children: Vec<InfoNode>,
}

impl InfoNode {
    pub fn leaf(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
            children: Vec::new(),
        }
    }

    pub fn branch(label: impl Into<String>, children: Vec<InfoNode>) -> Self {
        Self {
            label: label.into(),
            value: String::new(),
            children,
        }
    }

    /// Depth-first count of this node and all descendants.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(InfoNode::node_count).sum::<usize>()
    }
}

/// Stream information captured from a parser when it announced an update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StreamInfoSnapshot {
    pub tree: Vec<InfoNode>,
    /// Short description per stream, indexed by stream number.
    pub stream_summaries: Vec<String>,
}

impl StreamInfoSnapshot {
    pub fn stream_count(&self) -> usize {
        self.stream_summaries.len()
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobOutcome {
    Finished,
    /// The worker honoured an abort request. Not an error.
    Cancelled,
    /// The parser gave up; the message is shown verbatim.
    Failed(String),
}
