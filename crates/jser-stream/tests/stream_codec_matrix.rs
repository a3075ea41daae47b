//! Hand-assembled stream matrix for the element decoder and encoder.

use jser_buffers::{ByteSink, IoSource, Writer};
use jser_stream::{
    elements_equal, encode, ArrayValues, ClassFlags, Content, ElementId, ElementKind, EqContext,
    FieldValue, GraphBuilder, Opcode, StreamDecoder, StreamError, StreamOptions,
};

const SER: u8 = 0x02;

fn header() -> Writer {
    let mut w = Writer::new();
    w.write_u16(0xaced);
    w.write_u16(5);
    w
}

fn op(w: &mut Writer, op: Opcode) {
    w.write_u8(op.byte());
}

fn utf(w: &mut Writer, s: &str) {
    w.write_u16(s.len() as u16);
    w.buf(s.as_bytes());
}

fn string(w: &mut Writer, s: &str) {
    op(w, Opcode::String);
    utf(w, s);
}

/// TC_CLASSDESC header up to and including the flags and field count.
fn class_desc(w: &mut Writer, name: &str, suid: i64, flags: u8, fields: i16) {
    op(w, Opcode::ClassDesc);
    utf(w, name);
    w.write_i64(suid);
    w.write_u8(flags);
    w.write_i16(fields);
}

fn element(content: &Content) -> ElementId {
    match content {
        Content::Element(id) => *id,
        other => panic!("expected an element, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Handles and resets
// ---------------------------------------------------------------------------

#[test]
fn reset_restarts_handles() {
    let mut w = header();
    string(&mut w, "foo");
    op(&mut w, Opcode::Reset);
    string(&mut w, "bar");
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0000);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = decoder.read_all().unwrap();
    assert_eq!(read.len(), 3);
    let ids: Vec<ElementId> = read.iter().map(|c| element(&c.content)).collect();
    let arena = decoder.arena();
    let texts: Vec<String> = ids
        .iter()
        .map(|&id| arena.string(id).unwrap().to_string_lossy())
        .collect();
    assert_eq!(texts, ["foo", "bar", "bar"]);
    assert_eq!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
    assert_eq!(arena.wire_handle(ids[0]), Some(0x7e0000));
    assert_eq!(arena.wire_handle(ids[1]), Some(0x7e0000));
    assert_eq!(decoder.handles().len(), 1);
}

#[test]
fn reference_errors() {
    let mut w = header();
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0000);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(decoder.read_content(), Err(StreamError::InvalidHandle(0x7e0000)));

    // A field type name must be a string, not an object.
    let mut w = header();
    class_desc(&mut w, "A", 1, SER, 1);
    w.write_u8(b'L');
    utf(&mut w, "self");
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0000);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert!(matches!(
        decoder.read_content(),
        Err(StreamError::WrongElementKind {
            expected: ElementKind::String,
            found: ElementKind::ClassDesc,
            ..
        })
    ));
}

// ---------------------------------------------------------------------------
// In-band exceptions
// ---------------------------------------------------------------------------

#[test]
fn exception_framing() {
    let mut w = header();
    op(&mut w, Opcode::Exception);
    op(&mut w, Opcode::Object);
    class_desc(&mut w, "java.io.IOException", 7_207_000_000_000_000_000, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    op(&mut w, Opcode::Reset);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = decoder.read_content().unwrap();
    assert!(read.is_exception);
    let arena = decoder.arena();
    let class = arena.object(element(&read.content)).unwrap().class_desc;
    assert_eq!(arena.class_name(class).unwrap(), "java.io.IOException");
    assert!(decoder.is_at_end().unwrap());
    assert!(decoder.handles().is_empty());
}

#[test]
fn exception_mid_object_discards_partial_handles() {
    let mut w = header();
    // Object[] with one element, interrupted before the element is written.
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "[Ljava.lang.Object;", 0, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    w.write_i32(1);
    op(&mut w, Opcode::Exception);
    string(&mut w, "boom");
    op(&mut w, Opcode::Reset);
    string(&mut w, "after");
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = decoder.read_content().unwrap();
    assert!(read.is_exception);
    let boom = element(&read.content);
    assert_eq!(decoder.arena().string(boom).unwrap().to_string_lossy(), "boom");
    // Handles restart after the exception: "boom" was registered at the base.
    assert_eq!(decoder.arena().wire_handle(boom), Some(0x7e0000));

    let next = decoder.read_content().unwrap();
    assert!(!next.is_exception);
    let after = element(&next.content);
    assert_eq!(decoder.arena().wire_handle(after), Some(0x7e0000));
}

#[test]
fn handles_after_exception_start_afresh_without_reset() {
    let mut w = header();
    op(&mut w, Opcode::Exception);
    string(&mut w, "boom");
    string(&mut w, "bar");
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0000);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = decoder.read_all().unwrap();
    let flags: Vec<bool> = read.iter().map(|c| c.is_exception).collect();
    assert_eq!(flags, [true, false, false]);
    let arena = decoder.arena();
    let texts: Vec<String> = read
        .iter()
        .map(|c| arena.string(element(&c.content)).unwrap().to_string_lossy())
        .collect();
    assert_eq!(texts, ["boom", "bar", "bar"]);
    assert_eq!(element(&read[1].content), element(&read[2].content));
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[test]
fn class_data_is_root_first() {
    // C extends B extends A; B is not serializable, C has a write method.
    let mut w = header();
    op(&mut w, Opcode::Object);
    class_desc(&mut w, "C", 3, SER | 0x01, 1);
    w.write_u8(b'I');
    utf(&mut w, "c");
    op(&mut w, Opcode::EndBlockData);
    class_desc(&mut w, "B", 2, 0, 0);
    op(&mut w, Opcode::EndBlockData);
    class_desc(&mut w, "A", 1, SER, 1);
    w.write_u8(b'I');
    utf(&mut w, "a");
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    // A's data, then C's data and annotation.
    w.write_i32(10);
    w.write_i32(30);
    op(&mut w, Opcode::BlockData);
    w.write_u8(2);
    w.buf(&[1, 2]);
    op(&mut w, Opcode::EndBlockData);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let id = element(&decoder.read_content().unwrap().content);
    let arena = decoder.arena();
    let obj = arena.object(id).unwrap();
    let names: Vec<&str> = obj
        .class_data
        .keys()
        .map(|&class| arena.class_name(class).unwrap())
        .collect();
    assert_eq!(names, ["A", "C"]);
    let a = &obj.class_data[0];
    assert_eq!(a.values["a"], FieldValue::Int(10));
    assert!(a.annotation.is_empty());
    let c = &obj.class_data[1];
    assert_eq!(c.values["c"], FieldValue::Int(30));
    assert_eq!(c.annotation, [Content::BlockData(vec![1, 2])]);
    // Descriptors C, B, A take the first three handles, the object the fourth.
    assert_eq!(arena.wire_handle(id), Some(0x7e0003));
    assert!(decoder.is_at_end().unwrap());
}

#[test]
fn self_referential_object() {
    let mut w = header();
    op(&mut w, Opcode::Object);
    class_desc(&mut w, "Node", 1, SER, 1);
    w.write_u8(b'L');
    utf(&mut w, "next");
    string(&mut w, "LNode;");
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    // desc = base, type name = base + 1, object = base + 2
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0002);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let id = element(&decoder.read_content().unwrap().content);
    let obj = decoder.arena().object(id).unwrap();
    assert_eq!(obj.class_data[0].values["next"], FieldValue::Object(Some(id)));
}

#[test]
fn externalizable_requires_block_data() {
    let mut w = header();
    op(&mut w, Opcode::Object);
    class_desc(&mut w, "Ext", 1, 0x04, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(
        decoder.read_content(),
        Err(StreamError::UnsupportedExternalizable("Ext".into()))
    );

    let mut w = header();
    op(&mut w, Opcode::Object);
    class_desc(&mut w, "Ext", 1, 0x04 | 0x08, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    op(&mut w, Opcode::BlockData);
    w.write_u8(1);
    w.write_u8(9);
    op(&mut w, Opcode::EndBlockData);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let id = element(&decoder.read_content().unwrap().content);
    let obj = decoder.arena().object(id).unwrap();
    assert_eq!(obj.class_data[0].annotation, [Content::BlockData(vec![9])]);
}

#[test]
fn class_desc_errors() {
    let mut w = header();
    class_desc(&mut w, "X", 1, SER | 0x04, 0);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert!(matches!(
        decoder.read_content(),
        Err(StreamError::ConflictingFlags { .. })
    ));

    let mut w = header();
    class_desc(&mut w, "X", 1, SER, 1);
    w.write_u8(b'L');
    utf(&mut w, "f");
    string(&mut w, "[I");
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert!(matches!(
        decoder.read_content(),
        Err(StreamError::TypeCodeMismatch { code: 'L', .. })
    ));

    let mut w = header();
    class_desc(&mut w, "X", 1, SER, 1);
    w.write_u8(b'Q');
    utf(&mut w, "f");
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(decoder.read_content(), Err(StreamError::InvalidTypeCode(b'Q')));

    let mut w = header();
    class_desc(&mut w, "X", 1, SER, -1);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(decoder.read_content(), Err(StreamError::NegativeLength(-1)));
}

// ---------------------------------------------------------------------------
// Arrays, enums, classes
// ---------------------------------------------------------------------------

#[test]
fn primitive_and_object_arrays() {
    let mut w = header();
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "[I", 0x4d_ba_60_26_76_ea_b2_a5, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    w.write_i32(3);
    for v in [1, -1, 7] {
        w.write_i32(v);
    }
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "[Ljava.lang.String;", 0, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    w.write_i32(3);
    string(&mut w, "x");
    op(&mut w, Opcode::Null);
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0004);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let ints = element(&decoder.read_content().unwrap().content);
    let strings = element(&decoder.read_content().unwrap().content);
    let arena = decoder.arena();
    assert_eq!(arena.array(ints).unwrap().values, ArrayValues::Int(vec![1, -1, 7]));
    let ArrayValues::Object(items) = &arena.array(strings).unwrap().values else {
        panic!("object array expected");
    };
    assert_eq!(items.len(), 3);
    assert_eq!(items[1], None);
    assert_eq!(items[0], items[2]);
}

#[test]
fn array_errors() {
    let mut w = header();
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "[B", 0, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    w.write_i32(-5);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(decoder.read_content(), Err(StreamError::NegativeLength(-5)));

    let mut w = header();
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "NotAnArray", 0, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    let bytes = w.flush();
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert_eq!(
        decoder.read_content(),
        Err(StreamError::NotAnArrayClass("NotAnArray".into()))
    );

    let mut w = header();
    op(&mut w, Opcode::Array);
    class_desc(&mut w, "[B", 0, SER, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    w.write_i32(100);
    w.buf(&[0; 10]);
    let bytes = w.flush();
    let options = StreamOptions {
        max_array_len: 50,
        ..Default::default()
    };
    let mut decoder =
        StreamDecoder::with_options(jser_buffers::Reader::new(&bytes), options).unwrap();
    assert_eq!(
        decoder.read_content(),
        Err(StreamError::ArrayTooLong { len: 100, max: 50 })
    );
    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    assert!(matches!(
        decoder.read_content(),
        Err(StreamError::Buffer(_))
    ));
}

#[test]
fn enum_and_class_objects() {
    let mut w = header();
    op(&mut w, Opcode::Enum);
    class_desc(&mut w, "Color", 0, SER | 0x10, 0);
    op(&mut w, Opcode::EndBlockData);
    class_desc(&mut w, "java.lang.Enum", 0, SER | 0x10, 0);
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    string(&mut w, "RED");
    op(&mut w, Opcode::Class);
    op(&mut w, Opcode::Reference);
    w.write_u32(0x7e0000);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let red = element(&decoder.read_content().unwrap().content);
    let class = element(&decoder.read_content().unwrap().content);
    let arena = decoder.arena();
    let constant = arena.enum_constant(red).unwrap();
    assert_eq!(arena.class_name(constant.class_desc).unwrap(), "Color");
    assert_eq!(arena.string(constant.constant).unwrap().to_string_lossy(), "RED");
    // Color, java.lang.Enum, the enum, then its name.
    assert_eq!(arena.wire_handle(red), Some(0x7e0002));
    assert_eq!(arena.wire_handle(constant.constant), Some(0x7e0003));
    assert_eq!(arena.class(class).unwrap().class_desc, constant.class_desc);
}

#[test]
fn proxy_class_desc() {
    let mut w = header();
    op(&mut w, Opcode::Object);
    op(&mut w, Opcode::ProxyClassDesc);
    w.write_i32(1);
    utf(&mut w, "java.lang.Runnable");
    op(&mut w, Opcode::EndBlockData);
    class_desc(&mut w, "java.lang.reflect.Proxy", 1, SER, 1);
    w.write_u8(b'L');
    utf(&mut w, "h");
    string(&mut w, "Ljava/lang/reflect/InvocationHandler;");
    op(&mut w, Opcode::EndBlockData);
    op(&mut w, Opcode::Null);
    // Proxy's field h, then nothing for the proxy class itself.
    op(&mut w, Opcode::Null);
    let bytes = w.flush();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let id = element(&decoder.read_content().unwrap().content);
    let arena = decoder.arena();
    let obj = arena.object(id).unwrap();
    assert_eq!(obj.class_data.len(), 2);
    assert_eq!(obj.class_data[0].values["h"], FieldValue::Object(None));
    assert!(obj.class_data[1].values.is_empty());
    assert!(matches!(
        arena.class_name(obj.class_desc),
        Err(StreamError::UnexpectedProxy(_))
    ));
    assert!(decoder.is_at_end().unwrap());
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn long_back_reference_chain_walks_without_recursion() {
    const LINKS: usize = 100_000;
    let mut b = GraphBuilder::new();
    let class = b.class_desc("Link", 1, ClassFlags::SERIALIZABLE).unwrap();
    b.add_field(class, "next", "LLink;").unwrap();
    let mut links: Vec<ElementId> = Vec::with_capacity(LINKS);
    for _ in 0..LINKS {
        let link = b.object(class).unwrap();
        b.set_field(link, "next", FieldValue::Object(links.last().copied()))
            .unwrap();
        links.push(link);
    }
    let contents: Vec<Content> = links.iter().map(|&l| Content::Element(l)).collect();
    let bytes = encode(&b.finish(), &contents).unwrap();

    // Each top-level link only back-references the previous one.
    let mut first = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = first.read_all().unwrap();
    assert_eq!(read.len(), LINKS);
    let mut second = StreamDecoder::from_bytes(&bytes).unwrap();
    let other = second.read_all().unwrap();

    let (a, b) = (first.arena(), second.arena());
    let x = element(&read[LINKS - 1].content);
    let y = element(&other[LINKS - 1].content);
    assert!(elements_equal(a, x, b, y, &mut EqContext::new()));
    assert!(!elements_equal(a, x, b, element(&other[LINKS - 2].content), &mut EqContext::new()));

    let again: Vec<Content> = read.iter().map(|c| c.content.clone()).collect();
    assert_eq!(encode(a, &again).unwrap(), bytes);
    assert!(encode(a, &[Content::Element(x)]).is_ok());

    let dump = a.dump(x);
    assert!(dump.ends_with("(depth limit 256)"), "{:?}", dump.lines().last());
}

fn sample_graph() -> (jser_stream::Arena, Vec<Content>) {
    let mut b = GraphBuilder::new();
    let object = b.class_desc("java.lang.Object", 0, ClassFlags::empty()).unwrap();
    let node = b.class_desc("Node", 42, ClassFlags::SERIALIZABLE).unwrap();
    b.set_super(node, Some(object)).unwrap();
    b.add_field(node, "weight", "D").unwrap();
    b.add_field(node, "next", "LNode;").unwrap();
    b.add_field(node, "tags", "[Ljava/lang/String;").unwrap();

    let custom = b
        .class_desc("Custom", 7, ClassFlags::SERIALIZABLE | ClassFlags::WRITE_METHOD)
        .unwrap();
    b.add_field(custom, "flag", "Z").unwrap();
    b.set_super(custom, Some(node)).unwrap();

    let strings = b.class_desc("[Ljava.lang.String;", 0, ClassFlags::SERIALIZABLE).unwrap();
    let bytes = b.class_desc("[B", 0, ClassFlags::SERIALIZABLE).unwrap();
    let color = b
        .class_desc("Color", 0, ClassFlags::SERIALIZABLE | ClassFlags::ENUM)
        .unwrap();
    let proxy = b.proxy_class_desc(&["java.lang.Runnable", "java.io.Closeable"]);
    b.set_super(proxy, Some(object)).unwrap();

    let first = b.object(custom).unwrap();
    let second = b.object(node).unwrap();
    let a = b.string("a");
    let long = b.string(&"é".repeat(40_000));
    let tags = b
        .array(strings, ArrayValues::Object(vec![Some(a), None, Some(long)]))
        .unwrap();
    b.set_field(first, "weight", FieldValue::Double(f64::NAN)).unwrap();
    b.set_field(first, "next", FieldValue::Object(Some(second))).unwrap();
    b.set_field(first, "tags", FieldValue::Object(Some(tags))).unwrap();
    b.set_field(first, "flag", FieldValue::Boolean(true)).unwrap();
    b.push_annotation(first, custom, Content::BlockData(vec![0xca, 0xfe]))
        .unwrap();
    b.push_annotation(first, custom, Content::Element(a)).unwrap();
    b.set_field(second, "next", FieldValue::Object(Some(first))).unwrap();

    let payload = b.array(bytes, ArrayValues::Byte(vec![-1; 300])).unwrap();
    let red = b.enum_constant(color, "RED").unwrap();
    let class = b.class_object(node).unwrap();
    let handler = b.object(proxy).unwrap();
    b.add_class_annotation(node, Content::Element(class)).unwrap();

    let contents = vec![
        Content::Element(first),
        Content::Null,
        Content::BlockData(vec![7; 600]),
        Content::Element(payload),
        Content::Element(red),
        Content::Element(red),
        Content::Element(handler),
    ];
    (b.finish(), contents)
}

#[test]
fn builder_graph_round_trip() {
    let (arena, contents) = sample_graph();
    let bytes = encode(&arena, &contents).unwrap();

    let mut decoder = StreamDecoder::from_bytes(&bytes).unwrap();
    let read = decoder.read_all().unwrap();
    assert_eq!(read.len(), contents.len());
    let mut cx = EqContext::new();
    for (original, decoded) in contents.iter().zip(&read) {
        assert!(!decoded.is_exception);
        assert!(jser_stream::contents_equal(
            &arena,
            std::slice::from_ref(original),
            decoder.arena(),
            std::slice::from_ref(&decoded.content),
            &mut cx,
        ));
    }
    // The repeated enum comes back as the same element.
    assert_eq!(read[4].content, read[5].content);
}

#[test]
fn decoding_is_idempotent() {
    let (arena, contents) = sample_graph();
    let bytes = encode(&arena, &contents).unwrap();

    let mut first = StreamDecoder::from_bytes(&bytes).unwrap();
    let first_read = first.read_all().unwrap();
    let mut second = StreamDecoder::new(IoSource::new(bytes.as_slice())).unwrap();
    let second_read = second.read_all().unwrap();

    assert_eq!(first_read, second_read);
    let a = first.arena();
    let b = second.arena();
    assert_eq!(a.len(), b.len());
    for (id, _) in a.iter() {
        assert_eq!(a.wire_handle(id), b.wire_handle(id));
        assert!(elements_equal(a, id, b, id, &mut EqContext::new()));
    }

    // Re-encoding the decoded arena reproduces the stream byte for byte.
    let decoded: Vec<Content> = first_read.into_iter().map(|c| c.content).collect();
    assert_eq!(encode(first.arena(), &decoded).unwrap(), bytes);
}

#[test]
fn truncated_stream_is_an_error() {
    let (arena, contents) = sample_graph();
    let bytes = encode(&arena, &contents).unwrap();
    for cut in [5, 20, bytes.len() / 2, bytes.len() - 1] {
        let mut decoder = StreamDecoder::from_bytes(&bytes[..cut]).unwrap();
        let result = decoder.read_all();
        assert!(result.is_err(), "cut at {cut} should fail");
    }
}
