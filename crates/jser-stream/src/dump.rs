//! Human-readable tree rendering of elements.

use std::collections::HashSet;
use std::fmt::Write;

use jser_buffers::print_octets_default;

use crate::{
    Arena, ArrayValues, ClassDesc, ClassDescInfo, Content, Element, ElementId, FieldKind,
    FieldValue,
};

/// Element nesting printed by default before a subtree is cut off.
pub const DEFAULT_DUMP_DEPTH: usize = 256;

/// Elements already printed during one dump; repeats become back-links.
#[derive(Debug)]
pub struct DumpContext {
    seen: HashSet<ElementId>,
    depth: usize,
    /// Print block data and byte arrays as hex octets, not just their length.
    pub octets: bool,
    /// Elements nested deeper than this print as a one-line stub.
    pub max_depth: usize,
}

impl Default for DumpContext {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            depth: 0,
            octets: false,
            max_depth: DEFAULT_DUMP_DEPTH,
        }
    }
}

impl DumpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_octets(mut self, octets: bool) -> Self {
        self.octets = octets;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpNode {
    pub label: String,
    pub children: Vec<DumpNode>,
}

impl DumpNode {
    fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    /// Same subtree under a new label prefix, e.g. a field name.
    fn named(self, name: &str) -> Self {
        Self {
            label: format!("{name}: {}", self.label),
            children: self.children,
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.label.clone();
        self.render_children("", &mut out);
        out
    }

    fn render_children(&self, tab: &str, out: &mut String) {
        let last = self.children.len().saturating_sub(1);
        for (i, child) in self.children.iter().enumerate() {
            let is_last = i == last;
            out.push('\n');
            out.push_str(tab);
            out.push_str(if is_last { "└─ " } else { "├─ " });
            out.push_str(&child.label);
            let child_tab = format!("{tab}{}  ", if is_last { " " } else { "│" });
            child.render_children(&child_tab, out);
        }
    }
}

impl Arena {
    /// Renders `id` and everything reachable from it.
    ///
    /// ```
    /// use jser_stream::GraphBuilder;
    ///
    /// let mut b = GraphBuilder::new();
    /// let s = b.string("hi");
    /// assert_eq!(b.arena().dump(s), "#0 string \"hi\"");
    /// ```
    pub fn dump(&self, id: ElementId) -> String {
        self.dump_node(id, &mut DumpContext::new()).render()
    }

    pub fn dump_content(&self, content: &Content, cx: &mut DumpContext) -> String {
        self.content_node(content, cx).render()
    }

    /// Tree for `id`. Past [`DumpContext::max_depth`] levels of nesting the
    /// element is printed as a stub and left unvisited.
    pub fn dump_node(&self, id: ElementId, cx: &mut DumpContext) -> DumpNode {
        if cx.depth >= cx.max_depth {
            return DumpNode::leaf(format!("{id} ... (depth limit {})", cx.max_depth));
        }
        cx.depth += 1;
        let node = self.element_node(id, cx);
        cx.depth -= 1;
        node
    }

    fn element_node(&self, id: ElementId, cx: &mut DumpContext) -> DumpNode {
        let element = match self.get(id) {
            Ok(element) => element,
            Err(_) => return DumpNode::leaf(format!("{id} <missing>")),
        };
        if !cx.seen.insert(id) {
            return DumpNode::leaf(format!("@{id} ({})", element.kind()));
        }
        let mut head = id.to_string();
        if let Some(handle) = self.wire_handle(id) {
            let _ = write!(head, " [0x{handle:x}]");
        }
        match element {
            Element::String(s) => {
                DumpNode::leaf(format!("{head} string {:?}", s.to_string_lossy()))
            }
            Element::ClassDesc(desc) => self.class_desc_node(head, desc, cx),
            Element::Object(obj) => {
                let mut children = vec![self.dump_node(obj.class_desc, cx).named("class")];
                for (class, data) in &obj.class_data {
                    let name = self
                        .class_desc(*class)
                        .map(ClassDesc::display_name)
                        .unwrap_or_default();
                    let mut fields: Vec<DumpNode> = data
                        .values
                        .iter()
                        .map(|(field, value)| self.field_value_node(value, cx).named(field))
                        .collect();
                    if !data.annotation.is_empty() {
                        fields.push(self.annotation_node(&data.annotation, cx));
                    }
                    children.push(DumpNode {
                        label: format!("data {name}"),
                        children: fields,
                    });
                }
                DumpNode {
                    label: format!("{head} object {}", self.class_label(obj.class_desc)),
                    children,
                }
            }
            Element::Class(class) => DumpNode {
                label: format!("{head} class {}", self.class_label(class.class_desc)),
                children: vec![self.dump_node(class.class_desc, cx).named("class")],
            },
            Element::Array(array) => {
                let mut children = vec![self.dump_node(array.class_desc, cx).named("class")];
                children.extend(self.array_nodes(&array.values, cx));
                DumpNode {
                    label: format!(
                        "{head} array {} ({})",
                        self.class_label(array.class_desc),
                        array.values.len()
                    ),
                    children,
                }
            }
            Element::Enum(constant) => {
                let name = self
                    .string(constant.constant)
                    .map(|s| s.to_string_lossy())
                    .unwrap_or_default();
                DumpNode {
                    label: format!("{head} enum {}.{name}", self.class_label(constant.class_desc)),
                    children: vec![
                        self.dump_node(constant.class_desc, cx).named("class"),
                        self.dump_node(constant.constant, cx).named("name"),
                    ],
                }
            }
        }
    }

    fn class_label(&self, class_desc: ElementId) -> String {
        self.class_desc(class_desc)
            .map(ClassDesc::display_name)
            .unwrap_or_else(|_| format!("{class_desc}?"))
    }

    fn class_desc_node(&self, head: String, desc: &ClassDesc, cx: &mut DumpContext) -> DumpNode {
        let label = match desc {
            ClassDesc::Named(named) => format!(
                "{head} class desc {} suid={}",
                named.name, named.serial_version_uid
            ),
            ClassDesc::Proxy(_) => format!("{head} proxy class desc {}", desc.display_name()),
        };
        DumpNode {
            label,
            children: self.info_nodes(desc.info(), cx),
        }
    }

    fn info_nodes(&self, info: &ClassDescInfo, cx: &mut DumpContext) -> Vec<DumpNode> {
        let mut nodes = vec![DumpNode::leaf(format!("flags 0x{:02x}", info.flags.bits()))];
        for field in &info.fields {
            nodes.push(match &field.kind {
                FieldKind::Primitive(kind) => {
                    DumpNode::leaf(format!("field {} {}", kind.keyword(), field.name))
                }
                FieldKind::Object { descriptor, .. } => {
                    DumpNode::leaf(format!("field {descriptor} {}", field.name))
                }
            });
        }
        if !info.annotation.is_empty() {
            nodes.push(self.annotation_node(&info.annotation, cx));
        }
        if let Some(super_class) = info.super_class {
            nodes.push(self.dump_node(super_class, cx).named("super"));
        }
        nodes
    }

    fn annotation_node(&self, items: &[Content], cx: &mut DumpContext) -> DumpNode {
        DumpNode {
            label: "annotation".to_owned(),
            children: items.iter().map(|c| self.content_node(c, cx)).collect(),
        }
    }

    fn content_node(&self, content: &Content, cx: &mut DumpContext) -> DumpNode {
        match content {
            Content::Null => DumpNode::leaf("null"),
            Content::Element(id) => self.dump_node(*id, cx),
            Content::BlockData(bytes) => {
                octets_node(format!("block data ({} bytes)", bytes.len()), bytes, cx)
            }
        }
    }

    fn field_value_node(&self, value: &FieldValue, cx: &mut DumpContext) -> DumpNode {
        match *value {
            FieldValue::Object(None) => DumpNode::leaf("null"),
            FieldValue::Object(Some(id)) => self.dump_node(id, cx),
            FieldValue::Byte(v) => DumpNode::leaf(v.to_string()),
            FieldValue::Char(v) => DumpNode::leaf(char_label(v)),
            FieldValue::Double(v) => DumpNode::leaf(format!("{v:?}")),
            FieldValue::Float(v) => DumpNode::leaf(format!("{v:?}")),
            FieldValue::Int(v) => DumpNode::leaf(v.to_string()),
            FieldValue::Long(v) => DumpNode::leaf(v.to_string()),
            FieldValue::Short(v) => DumpNode::leaf(v.to_string()),
            FieldValue::Boolean(v) => DumpNode::leaf(v.to_string()),
        }
    }

    fn array_nodes(&self, values: &ArrayValues, cx: &mut DumpContext) -> Vec<DumpNode> {
        fn indexed<T>(items: &[T], show: impl Fn(&T) -> String) -> Vec<DumpNode> {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| DumpNode::leaf(format!("[{i}] {}", show(item))))
                .collect()
        }
        match values {
            ArrayValues::Byte(v) => {
                let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                if bytes.is_empty() {
                    Vec::new()
                } else {
                    vec![octets_node("bytes".to_owned(), &bytes, cx)]
                }
            }
            ArrayValues::Char(v) => indexed(v, |&c| char_label(c)),
            ArrayValues::Double(v) => indexed(v, |d| format!("{d:?}")),
            ArrayValues::Float(v) => indexed(v, |f| format!("{f:?}")),
            ArrayValues::Int(v) => indexed(v, i32::to_string),
            ArrayValues::Long(v) => indexed(v, i64::to_string),
            ArrayValues::Short(v) => indexed(v, i16::to_string),
            ArrayValues::Boolean(v) => indexed(v, bool::to_string),
            ArrayValues::Object(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Some(id) => self.dump_node(*id, cx).named(&format!("[{i}]")),
                    None => DumpNode::leaf(format!("[{i}] null")),
                })
                .collect(),
        }
    }
}

fn octets_node(label: String, bytes: &[u8], cx: &DumpContext) -> DumpNode {
    let children = if cx.octets && !bytes.is_empty() {
        vec![DumpNode::leaf(print_octets_default(bytes))]
    } else {
        Vec::new()
    };
    DumpNode { label, children }
}

fn char_label(unit: u16) -> String {
    match char::from_u32(unit as u32) {
        Some(c) if !c.is_control() => format!("{c:?}"),
        _ => format!("\\u{unit:04x}"),
    }
}

#[cfg(test)]
mod tests {
    use crate::{ClassFlags, FieldValue, GraphBuilder};

    #[test]
    fn test_cycle_renders_back_link() {
        let mut b = GraphBuilder::new();
        let class = b.class_desc("Node", 1, ClassFlags::SERIALIZABLE).unwrap();
        b.add_field(class, "size", "I").unwrap();
        b.add_field(class, "next", "LNode;").unwrap();
        let node = b.object(class).unwrap();
        b.set_field(node, "size", FieldValue::Int(3)).unwrap();
        b.set_field(node, "next", FieldValue::Object(Some(node))).unwrap();
        let arena = b.finish();

        let expected = "\
#2 object Node
├─ class: #0 class desc Node suid=1
│  ├─ flags 0x02
│  ├─ field int size
│  └─ field Node next
└─ data Node
   ├─ size: 3
   └─ next: @#2 (object)";
        assert_eq!(arena.dump(node), expected);
    }

    #[test]
    fn test_deep_chain_is_cut_at_depth_limit() {
        use super::DumpContext;

        let mut b = GraphBuilder::new();
        let class = b.class_desc("Link", 1, ClassFlags::SERIALIZABLE).unwrap();
        b.add_field(class, "next", "LLink;").unwrap();
        let mut prev = None;
        for _ in 0..100_000 {
            let link = b.object(class).unwrap();
            b.set_field(link, "next", FieldValue::Object(prev)).unwrap();
            prev = Some(link);
        }
        let (arena, last) = (b.finish(), prev.unwrap());

        let full = arena.dump(last);
        assert!(full.ends_with("... (depth limit 256)"), "{:?}", full.lines().last());

        let short = arena.dump_node(last, &mut DumpContext::new().with_max_depth(2));
        let text = short.render();
        assert!(text.starts_with(&format!("{last} object Link")), "{text}");
        assert_eq!(text.matches("depth limit 2").count(), 2, "{text}");
    }

    #[test]
    fn test_block_data_octets() {
        use super::DumpContext;
        use crate::{Arena, Content};

        let arena = Arena::new();
        let content = Content::BlockData(vec![0xac, 0xed]);
        assert_eq!(
            arena.dump_content(&content, &mut DumpContext::new()),
            "block data (2 bytes)"
        );
        assert_eq!(
            arena.dump_content(&content, &mut DumpContext::new().with_octets(true)),
            "block data (2 bytes)\n└─ ac ed"
        );
    }
}
