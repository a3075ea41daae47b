//! Structural equality of element graphs, possibly from different arenas.
//!
//! Element ids are arena-local, so two decodes of the same stream cannot be
//! compared with `==` on the elements themselves once links are involved.
//! Instead links are followed in both arenas in lockstep. Each element pair
//! is compared shallowly and its linked pairs go on a worklist, so long
//! chains need no native stack. A pair that has already been taken from the
//! worklist is assumed equal; every other pair still has to hold, so a real
//! difference anywhere makes the whole result `false` while cycles
//! terminate.

use std::collections::HashSet;

use crate::{
    Arena, ArrayValues, ClassData, ClassDesc, ClassDescInfo, Content, Element, ElementId,
    FieldKind, FieldValue,
};

type Pairs = Vec<(ElementId, ElementId)>;

/// Pairs of elements visited during one comparison.
#[derive(Debug, Default)]
pub struct EqContext {
    visited: HashSet<(ElementId, ElementId)>,
    pending: Pairs,
}

impl EqContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether element `x` of arena `a` is structurally equal to element `y` of
/// arena `b`. Ids that do not exist in their arena compare unequal.
pub fn elements_equal(
    a: &Arena,
    x: ElementId,
    b: &Arena,
    y: ElementId,
    cx: &mut EqContext,
) -> bool {
    cx.pending.clear();
    cx.pending.push((x, y));
    drain(a, b, cx)
}

/// Pairwise [`Content`] comparison of two sequences.
pub fn contents_equal(
    a: &Arena,
    xs: &[Content],
    b: &Arena,
    ys: &[Content],
    cx: &mut EqContext,
) -> bool {
    cx.pending.clear();
    contents_eq(xs, ys, &mut cx.pending) && drain(a, b, cx)
}

fn drain(a: &Arena, b: &Arena, cx: &mut EqContext) -> bool {
    while let Some((x, y)) = cx.pending.pop() {
        if !cx.visited.insert((x, y)) {
            continue;
        }
        let equal = match (a.get(x), b.get(y)) {
            (Ok(left), Ok(right)) => element_eq(left, right, &mut cx.pending),
            _ => false,
        };
        if !equal {
            cx.pending.clear();
            return false;
        }
    }
    true
}

fn contents_eq(xs: &[Content], ys: &[Content], links: &mut Pairs) -> bool {
    xs.len() == ys.len()
        && xs.iter().zip(ys).all(|(x, y)| match (x, y) {
            (Content::Null, Content::Null) => true,
            (Content::BlockData(l), Content::BlockData(r)) => l == r,
            (Content::Element(l), Content::Element(r)) => {
                links.push((*l, *r));
                true
            }
            _ => false,
        })
}

fn opt_eq(x: Option<ElementId>, y: Option<ElementId>, links: &mut Pairs) -> bool {
    match (x, y) {
        (None, None) => true,
        (Some(x), Some(y)) => {
            links.push((x, y));
            true
        }
        _ => false,
    }
}

fn element_eq(x: &Element, y: &Element, links: &mut Pairs) -> bool {
    match (x, y) {
        (Element::String(l), Element::String(r)) => l == r,
        (Element::ClassDesc(l), Element::ClassDesc(r)) => class_desc_eq(l, r, links),
        (Element::Object(l), Element::Object(r)) => {
            links.push((l.class_desc, r.class_desc));
            l.class_data.len() == r.class_data.len()
                && l.class_data
                    .iter()
                    .zip(&r.class_data)
                    .all(|((lc, ld), (rc, rd))| {
                        links.push((*lc, *rc));
                        class_data_eq(ld, rd, links)
                    })
        }
        (Element::Class(l), Element::Class(r)) => {
            links.push((l.class_desc, r.class_desc));
            true
        }
        (Element::Array(l), Element::Array(r)) => {
            links.push((l.class_desc, r.class_desc));
            array_values_eq(&l.values, &r.values, links)
        }
        (Element::Enum(l), Element::Enum(r)) => {
            links.push((l.class_desc, r.class_desc));
            links.push((l.constant, r.constant));
            true
        }
        _ => false,
    }
}

fn class_desc_eq(x: &ClassDesc, y: &ClassDesc, links: &mut Pairs) -> bool {
    match (x, y) {
        (ClassDesc::Named(l), ClassDesc::Named(r)) => {
            l.name == r.name
                && l.serial_version_uid == r.serial_version_uid
                && info_eq(&l.info, &r.info, links)
        }
        (ClassDesc::Proxy(l), ClassDesc::Proxy(r)) => {
            l.interfaces == r.interfaces && info_eq(&l.info, &r.info, links)
        }
        _ => false,
    }
}

fn info_eq(x: &ClassDescInfo, y: &ClassDescInfo, links: &mut Pairs) -> bool {
    x.flags == y.flags
        && x.fields.len() == y.fields.len()
        && x.fields.iter().zip(&y.fields).all(|(l, r)| {
            l.name == r.name
                && match (&l.kind, &r.kind) {
                    (FieldKind::Primitive(lk), FieldKind::Primitive(rk)) => lk == rk,
                    (
                        FieldKind::Object {
                            descriptor: ld,
                            type_name: ln,
                        },
                        FieldKind::Object {
                            descriptor: rd,
                            type_name: rn,
                        },
                    ) => {
                        links.push((*ln, *rn));
                        ld == rd
                    }
                    _ => false,
                }
        })
        && contents_eq(&x.annotation, &y.annotation, links)
        && opt_eq(x.super_class, y.super_class, links)
}

fn class_data_eq(x: &ClassData, y: &ClassData, links: &mut Pairs) -> bool {
    x.values.len() == y.values.len()
        && x.values
            .iter()
            .zip(&y.values)
            .all(|((ln, lv), (rn, rv))| ln == rn && field_value_eq(lv, rv, links))
        && contents_eq(&x.annotation, &y.annotation, links)
}

/// Floating-point values compare by bit pattern, so `NaN` equals itself.
fn field_value_eq(x: &FieldValue, y: &FieldValue, links: &mut Pairs) -> bool {
    match (*x, *y) {
        (FieldValue::Double(l), FieldValue::Double(r)) => l.to_bits() == r.to_bits(),
        (FieldValue::Float(l), FieldValue::Float(r)) => l.to_bits() == r.to_bits(),
        (FieldValue::Object(l), FieldValue::Object(r)) => opt_eq(l, r, links),
        (l, r) => l == r,
    }
}

fn array_values_eq(x: &ArrayValues, y: &ArrayValues, links: &mut Pairs) -> bool {
    match (x, y) {
        (ArrayValues::Double(l), ArrayValues::Double(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(p, q)| p.to_bits() == q.to_bits())
        }
        (ArrayValues::Float(l), ArrayValues::Float(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(p, q)| p.to_bits() == q.to_bits())
        }
        (ArrayValues::Object(l), ArrayValues::Object(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(p, q)| opt_eq(*p, *q, links))
        }
        (l, r) => l == r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClassFlags, GraphBuilder};

    fn node_graph(label: &str) -> (Arena, ElementId) {
        let mut b = GraphBuilder::new();
        let class = b.class_desc("Node", 1, ClassFlags::SERIALIZABLE).unwrap();
        b.add_field(class, "next", "LNode;").unwrap();
        b.add_field(class, "label", "Ljava/lang/String;").unwrap();
        let node = b.object(class).unwrap();
        let text = b.string(label);
        b.set_field(node, "next", FieldValue::Object(Some(node))).unwrap();
        b.set_field(node, "label", FieldValue::Object(Some(text))).unwrap();
        (b.finish(), node)
    }

    #[test]
    fn test_cycles_terminate() {
        let (a, x) = node_graph("n");
        let (b, y) = node_graph("n");
        assert!(elements_equal(&a, x, &b, y, &mut EqContext::new()));
        let (c, z) = node_graph("m");
        assert!(!elements_equal(&a, x, &c, z, &mut EqContext::new()));
    }

    /// `len` objects, each linking to the one created before it.
    fn chain(len: usize, tail: i32) -> (Arena, ElementId) {
        let mut b = GraphBuilder::new();
        let class = b.class_desc("Link", 1, ClassFlags::SERIALIZABLE).unwrap();
        b.add_field(class, "value", "I").unwrap();
        b.add_field(class, "next", "LLink;").unwrap();
        let mut prev = None;
        for i in 0..len {
            let link = b.object(class).unwrap();
            let value = if i == 0 { tail } else { 0 };
            b.set_field(link, "value", FieldValue::Int(value)).unwrap();
            b.set_field(link, "next", FieldValue::Object(prev)).unwrap();
            prev = Some(link);
        }
        (b.finish(), prev.unwrap())
    }

    #[test]
    fn test_long_chain_compares_without_recursion() {
        let (a, x) = chain(100_000, 1);
        let (b, y) = chain(100_000, 1);
        assert!(elements_equal(&a, x, &b, y, &mut EqContext::new()));
        let (c, z) = chain(100_000, 2);
        assert!(!elements_equal(&a, x, &c, z, &mut EqContext::new()));
    }

    #[test]
    fn test_nan_by_bits() {
        let mut b = GraphBuilder::new();
        let class = b.class_desc("[D", 0, ClassFlags::SERIALIZABLE).unwrap();
        let x = b.array(class, ArrayValues::Double(vec![f64::NAN])).unwrap();
        let y = b.array(class, ArrayValues::Double(vec![f64::NAN])).unwrap();
        let z = b.array(class, ArrayValues::Double(vec![-f64::NAN])).unwrap();
        let arena = b.finish();
        assert!(elements_equal(&arena, x, &arena, y, &mut EqContext::new()));
        assert!(!elements_equal(&arena, x, &arena, z, &mut EqContext::new()));
    }

    #[test]
    fn test_kind_and_missing() {
        let mut b = GraphBuilder::new();
        let s = b.string("s");
        let class = b.class_desc("S", 0, ClassFlags::SERIALIZABLE).unwrap();
        let arena = b.finish();
        assert!(!elements_equal(&arena, s, &arena, class, &mut EqContext::new()));
        assert!(!elements_equal(&arena, s, &Arena::new(), s, &mut EqContext::new()));
        assert!(contents_equal(
            &arena,
            &[Content::Null, Content::BlockData(vec![1])],
            &Arena::new(),
            &[Content::Null, Content::BlockData(vec![1])],
            &mut EqContext::new(),
        ));
    }
}
