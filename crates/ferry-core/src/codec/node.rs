//! Snapshot の中身（wire format）
//!
//! 参照値（Buffer / Array / Object）は `nodes` に平らに並べ、子からは
//! `Slot::Ref(index)` で指す。index は最初に現れた順（preorder）。
//! 同じ参照が 2 回出てきたら同じ index を指すので、1 メッセージ内の共有と循環が保存される。
//! JSON のネストは値の深さに依存しない。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NonFinite {
    Nan,
    PosInfinity,
    NegInfinity,
}

impl NonFinite {
    pub(crate) fn classify(n: f64) -> Option<Self> {
        if n.is_nan() {
            Some(NonFinite::Nan)
        } else if n == f64::INFINITY {
            Some(NonFinite::PosInfinity)
        } else if n == f64::NEG_INFINITY {
            Some(NonFinite::NegInfinity)
        } else {
            None
        }
    }

    pub(crate) fn value(self) -> f64 {
        match self {
            NonFinite::Nan => f64::NAN,
            NonFinite::PosInfinity => f64::INFINITY,
            NonFinite::NegInfinity => f64::NEG_INFINITY,
        }
    }
}

/// A primitive stored in place, or a reference into [`Graph::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub(crate) enum Slot {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    NonFinite(NonFinite),
    String(String),
    Ref(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub(crate) enum Node {
    Buffer(Vec<u8>),
    Array(Vec<Slot>),
    Object(Vec<(String, Slot)>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Graph {
    pub(crate) root: Slot,
    pub(crate) nodes: Vec<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::nan(f64::NAN, Some(NonFinite::Nan))]
    #[case::pos(f64::INFINITY, Some(NonFinite::PosInfinity))]
    #[case::neg(f64::NEG_INFINITY, Some(NonFinite::NegInfinity))]
    #[case::finite(1.5, None)]
    #[case::neg_zero(-0.0, None)]
    fn classify(#[case] n: f64, #[case] expected: Option<NonFinite>) {
        assert_eq!(NonFinite::classify(n), expected);
    }

    #[test]
    fn graph_is_tagged_and_flat_in_json() {
        let graph = Graph {
            root: Slot::Ref(0),
            nodes: vec![
                Node::Array(vec![Slot::Null, Slot::Ref(1)]),
                Node::Array(vec![Slot::Ref(0)]),
            ],
        };
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["root"]["t"], "ref");
        assert_eq!(json["nodes"][0]["t"], "array");
        assert_eq!(json["nodes"][0]["v"][1]["v"], 1);
        assert_eq!(json["nodes"][1]["v"][0]["t"], "ref");
    }
}
