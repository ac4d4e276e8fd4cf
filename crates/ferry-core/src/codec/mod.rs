//! Codec - structured clone 方式のシリアライザ
//!
//! `serialize(value) -> Snapshot` / `deserialize(&Snapshot) -> Value`
//!
//! - プリミティブ、Array / Object、バイナリ（Buffer）を扱う
//! - 1 メッセージ内の共有（同じ参照が 2 回）と循環は保存する
//! - Array / Object のネストは `MAX_DEPTH` まで。超えたら送信側で `TooDeep`
//! - メッセージをまたいだ identity は保存しない（deserialize のたびに新しい実体）
//! - Function / Handle は `SerializationError::Unsupported`

mod node;

use std::collections::HashMap;

use self::node::{Graph, Node, NonFinite, Slot};
use crate::domain::{Array, Buffer, Object, Value};

pub use crate::domain::value::MAX_DEPTH;
use crate::error::SerializationError;

/// Opaque, transportable copy of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    /// Wrap raw bytes received from elsewhere. Validity is checked on
    /// [`deserialize`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fails with [`SerializationError::Unsupported`] on live values and with
/// [`SerializationError::TooDeep`] past [`MAX_DEPTH`]; either way before
/// anything is produced.
pub fn serialize(value: &Value) -> Result<Snapshot, SerializationError> {
    let mut encoder = Encoder::default();
    let root = encoder.encode(value, 0)?;
    let graph = Graph {
        root,
        nodes: encoder.nodes,
    };
    let bytes = serde_json::to_vec(&graph)?;
    Ok(Snapshot { bytes })
}

pub fn deserialize(snapshot: &Snapshot) -> Result<Value, SerializationError> {
    let graph: Graph = serde_json::from_slice(&snapshot.bytes)?;
    decode(graph)
}

/// `deserialize(serialize(value))`: a deep copy that shares nothing with `value`.
pub fn structured_clone(value: &Value) -> Result<Value, SerializationError> {
    deserialize(&serialize(value)?)
}

#[derive(Default)]
struct Encoder {
    /// reference address -> node index
    ids: HashMap<usize, u32>,
    nodes: Vec<Node>,
}

impl Encoder {
    /// 子より先に index を確保する（自己参照が同じ index を引けるように）
    fn reserve(&mut self, addr: usize, node: Node) -> u32 {
        let id = self.nodes.len() as u32;
        self.ids.insert(addr, id);
        self.nodes.push(node);
        id
    }

    fn encode(&mut self, value: &Value, depth: usize) -> Result<Slot, SerializationError> {
        if let Some(addr) = value.ref_addr()
            && let Some(&id) = self.ids.get(&addr)
        {
            return Ok(Slot::Ref(id));
        }

        let slot = match value {
            Value::Undefined => Slot::Undefined,
            Value::Null => Slot::Null,
            Value::Bool(b) => Slot::Bool(*b),
            Value::Number(n) => match NonFinite::classify(*n) {
                Some(special) => Slot::NonFinite(special),
                None => Slot::Number(*n),
            },
            Value::String(s) => Slot::String(s.clone()),
            Value::Buffer(b) => Slot::Ref(self.reserve(b.addr(), Node::Buffer(b.to_vec()))),
            Value::Array(a) => {
                let depth = descend(depth)?;
                let id = self.reserve(a.addr(), Node::Array(Vec::new()));
                let items = a
                    .to_vec()
                    .iter()
                    .map(|item| self.encode(item, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                self.nodes[id as usize] = Node::Array(items);
                Slot::Ref(id)
            }
            Value::Object(o) => {
                let depth = descend(depth)?;
                let id = self.reserve(o.addr(), Node::Object(Vec::new()));
                let mut entries = Vec::with_capacity(o.len());
                for (key, item) in o.entries() {
                    entries.push((key, self.encode(&item, depth)?));
                }
                self.nodes[id as usize] = Node::Object(entries);
                Slot::Ref(id)
            }
            Value::Function(_) | Value::Handle(_) => {
                return Err(SerializationError::Unsupported { kind: value.kind() });
            }
        };
        Ok(slot)
    }
}

fn descend(depth: usize) -> Result<usize, SerializationError> {
    if depth >= MAX_DEPTH {
        return Err(SerializationError::TooDeep { limit: MAX_DEPTH });
    }
    Ok(depth + 1)
}

enum Fill {
    Array(Array, Vec<Slot>),
    Object(Object, Vec<(String, Slot)>),
}

/// 2 パス: まず全ノードの実体を作り、それから中身を埋める。再帰しない。
fn decode(graph: Graph) -> Result<Value, SerializationError> {
    let mut table = Vec::with_capacity(graph.nodes.len());
    let mut fills = Vec::new();
    for node in graph.nodes {
        match node {
            Node::Buffer(bytes) => table.push(Value::Buffer(Buffer::new(bytes))),
            Node::Array(items) => {
                let array = Array::new(Vec::with_capacity(items.len()));
                table.push(Value::Array(array.clone()));
                fills.push(Fill::Array(array, items));
            }
            Node::Object(entries) => {
                let object = Object::new();
                table.push(Value::Object(object.clone()));
                fills.push(Fill::Object(object, entries));
            }
        }
    }

    for fill in fills {
        match fill {
            Fill::Array(array, items) => {
                for slot in items {
                    array.push(resolve(&table, slot)?);
                }
            }
            Fill::Object(object, entries) => {
                for (key, slot) in entries {
                    object.insert(key, resolve(&table, slot)?);
                }
            }
        }
    }
    resolve(&table, graph.root)
}

fn resolve(table: &[Value], slot: Slot) -> Result<Value, SerializationError> {
    let value = match slot {
        Slot::Undefined => Value::Undefined,
        Slot::Null => Value::Null,
        Slot::Bool(b) => Value::Bool(b),
        Slot::Number(n) => Value::Number(n),
        Slot::NonFinite(special) => Value::Number(special.value()),
        Slot::String(s) => Value::String(s),
        Slot::Ref(id) => table
            .get(id as usize)
            .cloned()
            .ok_or(SerializationError::DanglingReference(id))?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Function, Handle};
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::undefined(Value::Undefined)]
    #[case::null(Value::Null)]
    #[case::boolean(Value::Bool(true))]
    #[case::number(Value::Number(42.5))]
    #[case::negative_zero(Value::Number(-0.0))]
    #[case::nan(Value::Number(f64::NAN))]
    #[case::infinity(Value::Number(f64::NEG_INFINITY))]
    #[case::string(Value::from("héllo"))]
    #[case::buffer(Value::buffer(vec![0u8, 1, 255]))]
    #[case::nested(Value::from(json!({"ping": 1, "deep": {"list": [1, [2, [3]]]}})))]
    fn round_trip_is_deep_equal(#[case] value: Value) {
        let copy = structured_clone(&value).unwrap();
        assert_eq!(copy, value);
    }

    #[test]
    fn negative_zero_keeps_its_sign() {
        let copy = structured_clone(&Value::Number(-0.0)).unwrap();
        assert!(copy.as_f64().unwrap().is_sign_negative());
    }

    #[test]
    fn copies_do_not_alias_the_input() {
        let original = Value::from(json!({"inner": {"n": 1}}));
        let copy = structured_clone(&original).unwrap();

        assert!(!copy.same_ref(&original));
        assert!(!copy.get("inner").unwrap().same_ref(&original.get("inner").unwrap()));

        copy.get("inner")
            .unwrap()
            .as_object()
            .unwrap()
            .insert("n", Value::from(2));
        assert_eq!(original.get("inner").unwrap().get("n"), Some(Value::from(1)));
    }

    #[test]
    fn shared_sub_objects_stay_shared_within_one_message() {
        let shared = Value::from(json!({"x": 1}));
        let root = Value::object([("a", shared.clone()), ("b", shared.clone())]);

        let copy = structured_clone(&root).unwrap();
        let a = copy.get("a").unwrap();
        let b = copy.get("b").unwrap();
        assert!(a.same_ref(&b));
        assert!(!a.same_ref(&shared));
    }

    #[test]
    fn identity_is_not_preserved_across_messages() {
        let value = Value::from(json!({"x": 1}));
        let snapshot = serialize(&value).unwrap();

        let first = deserialize(&snapshot).unwrap();
        let second = deserialize(&snapshot).unwrap();
        assert_eq!(first, second);
        assert!(!first.same_ref(&second));
    }

    #[test]
    fn shared_buffers_stay_shared() {
        let buf = Value::buffer(vec![1u8, 2, 3]);
        let copy = structured_clone(&Value::array([buf.clone(), buf])).unwrap();
        let arr = copy.as_array().unwrap();
        assert!(arr.get(0).unwrap().same_ref(&arr.get(1).unwrap()));
    }

    #[test]
    fn cycles_round_trip() {
        let obj = Object::new();
        obj.insert("name", Value::from("loop"));
        obj.insert("me", Value::Object(obj.clone()));

        let copy = structured_clone(&Value::Object(obj)).unwrap();
        let me = copy.get("me").unwrap();
        assert!(me.same_ref(&copy));
        assert_eq!(me.get("name"), Some(Value::from("loop")));
    }

    #[rstest]
    #[case::function(Value::Function(Function::new(|_| Value::Null)), "function")]
    #[case::handle(Value::Handle(Handle::new("worker", ())), "handle")]
    fn live_values_are_rejected(#[case] value: Value, #[case] kind: &str) {
        let nested = Value::object([("cb", value)]);
        let err = serialize(&nested).unwrap_err();
        assert!(matches!(err, SerializationError::Unsupported { kind: k } if k == kind));
    }

    /// `depth` 段の入れ子。`{"next": {"next": ... {}}}` または `[[...[]]]`
    fn nested(depth: usize, arrays: bool) -> Value {
        let mut value = if arrays {
            Value::array(Vec::new())
        } else {
            Value::Object(Object::new())
        };
        for _ in 1..depth {
            value = if arrays {
                Value::array([value])
            } else {
                Value::object([("next", value)])
            };
        }
        value
    }

    #[rstest]
    #[case::objects(false)]
    #[case::arrays(true)]
    fn nesting_up_to_the_limit_round_trips(#[case] arrays: bool) {
        let value = nested(MAX_DEPTH, arrays);
        let copy = structured_clone(&value).unwrap();
        assert_eq!(copy, value);
    }

    #[rstest]
    #[case::objects(false)]
    #[case::arrays(true)]
    fn nesting_past_the_limit_fails_at_serialize(#[case] arrays: bool) {
        let err = serialize(&nested(MAX_DEPTH + 1, arrays)).unwrap_err();
        assert!(matches!(err, SerializationError::TooDeep { limit } if limit == MAX_DEPTH));
    }

    #[test]
    fn very_deep_values_are_rejected_without_exhausting_the_stack() {
        let value = nested(200_000, false);
        assert!(matches!(
            serialize(&value),
            Err(SerializationError::TooDeep { .. })
        ));
        // 比較と drop も再帰しない
        assert!(value.deep_eq(&nested(200_000, false)));
    }

    #[test]
    fn depth_counts_nesting_not_size() {
        // 幅は制限しない。共有された部分木は 1 回だけ数える
        let shared = nested(MAX_DEPTH - 1, false);
        let wide = Value::array((0..1_000).map(|_| shared.clone()));
        let copy = structured_clone(&wide).unwrap();
        let arr = copy.as_array().unwrap();
        assert_eq!(arr.len(), 1_000);
        assert!(arr.get(0).unwrap().same_ref(&arr.get(999).unwrap()));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = deserialize(&Snapshot::from_bytes(b"not json".to_vec())).unwrap_err();
        assert!(matches!(err, SerializationError::Decode(_)));
    }

    #[test]
    fn dangling_references_are_reported() {
        let graph = Graph {
            root: Slot::Ref(0),
            nodes: vec![Node::Array(vec![Slot::Ref(7)])],
        };
        let bytes = serde_json::to_vec(&graph).unwrap();
        let err = deserialize(&Snapshot::from_bytes(bytes)).unwrap_err();
        assert!(matches!(err, SerializationError::DanglingReference(7)));
    }
}
