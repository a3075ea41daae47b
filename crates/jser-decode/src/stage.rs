//! Staged construction of runtime values.
//!
//! Every element that becomes a value gets one decoder, which moves through
//! `Unstarted -> Initial -> Comparable -> Complete`. `Initial` allocates the
//! value without looking at other objects. `Comparable` and `Complete` may
//! declare other decoders that must reach the same stage; those are processed
//! as one batch with a breadth-first worklist, and no member's stage is
//! committed until the whole batch has run. Cycles terminate because a
//! decoder already in the running batch is never stepped again.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use jser_stream::{Arena, Element, ElementId};
use tracing::{debug, trace};

use crate::builtins::{ArrayDecoder, ClassObjectDecoder, NullDecoder, StringDecoder};
use crate::{ClassRegistry, DecodeError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Unstarted,
    Initial,
    Comparable,
    Complete,
}

/// Index of a decoder within a [`DecoderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecoderId(usize);

impl fmt::Display for DecoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Per-element construction steps.
///
/// Steps receive the context so they can look up other elements' decoders
/// and values. A step must not assume another decoder has passed `Initial`
/// unless it asked for that with [`DecoderContext::ensure_comparable`] or
/// [`DecoderContext::ensure_complete`].
pub trait ObjectDecoder {
    /// Allocates the value. `None` stands for the null value and finishes the
    /// decoder on the spot.
    fn build_initial(&mut self, cx: &mut DecoderContext<'_>) -> Result<Option<Value>, DecodeError>;

    /// Makes the value usable as a map key or set member. Returns the
    /// decoders that must also become comparable.
    fn build_comparable(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        Ok(Vec::new())
    }

    /// Fills in everything else. Returns the decoders that must also
    /// complete.
    fn build_complete(
        &mut self,
        _cx: &mut DecoderContext<'_>,
    ) -> Result<Vec<DecoderId>, DecodeError> {
        Ok(Vec::new())
    }
}

struct Slot {
    stage: Stage,
    value: Value,
    /// Taken out while one of its steps runs.
    decoder: Option<Box<dyn ObjectDecoder>>,
}

/// Decoders of one session, cached by the element they decode.
#[derive(Default)]
pub struct DecoderState {
    slots: Vec<Slot>,
    by_element: HashMap<Option<ElementId>, DecoderId>,
    comparable_batch: HashSet<DecoderId>,
    complete_batch: HashSet<DecoderId>,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drops every decoder and value. Streams never need this, since element
    /// ids stay valid across resets.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Empties every container value built by this state, then drops the
    /// decoders.
    pub fn release_values(&mut self) {
        for slot in &self.slots {
            slot.value.clear_links();
        }
        debug!(decoders = self.slots.len(), "released values");
        self.clear();
    }

    fn slot(&self, id: DecoderId) -> Result<&Slot, DecodeError> {
        self.slots.get(id.0).ok_or(DecodeError::UnknownDecoder(id))
    }

    fn slot_mut(&mut self, id: DecoderId) -> Result<&mut Slot, DecodeError> {
        self.slots
            .get_mut(id.0)
            .ok_or(DecodeError::UnknownDecoder(id))
    }
}

/// What a decoder step can see: the element arena, the class registry and
/// every other decoder of the session.
pub struct DecoderContext<'a> {
    arena: &'a Arena,
    registry: &'a dyn ClassRegistry,
    state: &'a mut DecoderState,
}

impl<'a> DecoderContext<'a> {
    pub fn new(
        arena: &'a Arena,
        registry: &'a dyn ClassRegistry,
        state: &'a mut DecoderState,
    ) -> Self {
        Self {
            arena,
            registry,
            state,
        }
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn registry(&self) -> &'a dyn ClassRegistry {
        self.registry
    }

    /// The decoder for `element`, created on first use. Strings, arrays,
    /// classes and null have fixed decoders; objects and enums are looked up
    /// in the registry by class name.
    pub fn decoder_for(&mut self, element: Option<ElementId>) -> Result<DecoderId, DecodeError> {
        if let Some(&id) = self.state.by_element.get(&element) {
            return Ok(id);
        }
        let decoder: Box<dyn ObjectDecoder> = match element {
            None => Box::new(NullDecoder),
            Some(element) => self.new_decoder(element)?,
        };
        let id = DecoderId(self.state.slots.len());
        self.state.slots.push(Slot {
            stage: Stage::Unstarted,
            value: Value::Null,
            decoder: Some(decoder),
        });
        self.state.by_element.insert(element, id);
        trace!(decoder = %id, ?element, "new decoder");
        Ok(id)
    }

    fn new_decoder(&mut self, element: ElementId) -> Result<Box<dyn ObjectDecoder>, DecodeError> {
        let (arena, registry) = (self.arena, self.registry);
        let decoder: Box<dyn ObjectDecoder> = match arena.get(element)? {
            Element::String(_) => Box::new(StringDecoder { element }),
            Element::Array(_) => Box::new(ArrayDecoder::new(element)),
            Element::Class(class) => Box::new(ClassObjectDecoder {
                class_desc: class.class_desc,
            }),
            Element::ClassDesc(_) => Box::new(ClassObjectDecoder {
                class_desc: element,
            }),
            Element::Object(obj) => {
                let name = arena.class_name(obj.class_desc)?;
                registry.decoder(name, self, element)?
            }
            Element::Enum(constant) => {
                let name = arena.class_name(constant.class_desc)?;
                registry.decoder(name, self, element)?
            }
        };
        Ok(decoder)
    }

    pub fn stage(&self, id: DecoderId) -> Result<Stage, DecodeError> {
        Ok(self.state.slot(id)?.stage)
    }

    /// Current value of a started decoder, at whatever stage it is.
    pub fn value(&self, id: DecoderId) -> Result<Value, DecodeError> {
        let slot = self.state.slot(id)?;
        if slot.stage == Stage::Unstarted {
            return Err(DecodeError::Unstarted(id));
        }
        Ok(slot.value.clone())
    }

    fn take_decoder(&mut self, id: DecoderId) -> Result<Box<dyn ObjectDecoder>, DecodeError> {
        self.state
            .slot_mut(id)?
            .decoder
            .take()
            .ok_or(DecodeError::ReentrantTransition(id))
    }

    fn put_decoder(&mut self, id: DecoderId, decoder: Box<dyn ObjectDecoder>) {
        if let Some(slot) = self.state.slots.get_mut(id.0) {
            slot.decoder = Some(decoder);
        }
    }

    pub fn ensure_initial(&mut self, id: DecoderId) -> Result<(), DecodeError> {
        if self.stage(id)? != Stage::Unstarted {
            return Ok(());
        }
        let mut decoder = self.take_decoder(id)?;
        let built = decoder.build_initial(self);
        self.put_decoder(id, decoder);
        let slot = self.state.slot_mut(id)?;
        match built? {
            Some(value) => {
                slot.value = value;
                slot.stage = Stage::Initial;
            }
            None => {
                slot.value = Value::Null;
                slot.stage = Stage::Complete;
            }
        }
        trace!(decoder = %id, stage = ?slot.stage, "initial");
        Ok(())
    }

    pub fn ensure_comparable(&mut self, root: DecoderId) -> Result<(), DecodeError> {
        self.ensure_initial(root)?;
        if self.stage(root)? >= Stage::Comparable || self.state.comparable_batch.contains(&root) {
            return Ok(());
        }
        let outermost = self.state.comparable_batch.is_empty();
        let result = self.run_comparable_batch(root);
        if outermost {
            self.finish_batch(Stage::Comparable, result.is_ok())?;
        }
        result
    }

    fn run_comparable_batch(&mut self, root: DecoderId) -> Result<(), DecodeError> {
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            self.ensure_initial(id)?;
            if self.stage(id)? >= Stage::Comparable || !self.state.comparable_batch.insert(id) {
                continue;
            }
            let mut decoder = self.take_decoder(id)?;
            let deps = decoder.build_comparable(self);
            self.put_decoder(id, decoder);
            queue.extend(deps?);
        }
        Ok(())
    }

    pub fn ensure_complete(&mut self, root: DecoderId) -> Result<(), DecodeError> {
        self.ensure_comparable(root)?;
        if self.stage(root)? == Stage::Complete || self.state.complete_batch.contains(&root) {
            return Ok(());
        }
        let outermost = self.state.complete_batch.is_empty();
        let result = self.run_complete_batch(root);
        if outermost {
            self.finish_batch(Stage::Complete, result.is_ok())?;
        }
        result
    }

    fn run_complete_batch(&mut self, root: DecoderId) -> Result<(), DecodeError> {
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            self.ensure_comparable(id)?;
            if self.stage(id)? == Stage::Complete || !self.state.complete_batch.insert(id) {
                continue;
            }
            let mut decoder = self.take_decoder(id)?;
            let deps = decoder.build_complete(self);
            self.put_decoder(id, decoder);
            queue.extend(deps?);
        }
        Ok(())
    }

    /// Commits the stage to every batch member, or forgets the batch if it
    /// failed part way.
    fn finish_batch(&mut self, stage: Stage, commit: bool) -> Result<(), DecodeError> {
        let batch = match stage {
            Stage::Complete => std::mem::take(&mut self.state.complete_batch),
            _ => std::mem::take(&mut self.state.comparable_batch),
        };
        if !commit {
            return Ok(());
        }
        debug!(?stage, members = batch.len(), "stage batch committed");
        for id in batch {
            let slot = self.state.slot_mut(id)?;
            slot.stage = slot.stage.max(stage);
        }
        Ok(())
    }

    pub fn get_initial(&mut self, id: DecoderId) -> Result<Value, DecodeError> {
        self.ensure_initial(id)?;
        self.value(id)
    }

    pub fn get_comparable(&mut self, id: DecoderId) -> Result<Value, DecodeError> {
        self.ensure_comparable(id)?;
        self.value(id)
    }

    pub fn get_complete(&mut self, id: DecoderId) -> Result<Value, DecodeError> {
        self.ensure_complete(id)?;
        self.value(id)
    }

    /// Decoder and initial value for a referenced element, the usual way a
    /// step resolves a field or annotation object.
    pub fn initial_for(
        &mut self,
        element: Option<ElementId>,
    ) -> Result<(DecoderId, Value), DecodeError> {
        let id = self.decoder_for(element)?;
        Ok((id, self.get_initial(id)?))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use jser_stream::{ClassFlags, FieldValue, GraphBuilder};

    use super::*;
    use crate::Registry;

    /// Counts step invocations and links every peer as a dependency.
    #[derive(Default)]
    struct Log {
        steps: Vec<(ElementId, Stage)>,
    }

    struct Recording {
        element: ElementId,
        log: Rc<RefCell<Log>>,
        asks_for_itself: bool,
    }

    impl Recording {
        fn peers(&self, cx: &mut DecoderContext<'_>) -> Result<Vec<DecoderId>, DecodeError> {
            let obj = cx.arena().object(self.element)?;
            let mut deps = Vec::new();
            for data in obj.class_data.values() {
                for value in data.values.values() {
                    if let FieldValue::Object(Some(peer)) = value {
                        deps.push(cx.decoder_for(Some(*peer))?);
                    }
                }
            }
            Ok(deps)
        }
    }

    impl ObjectDecoder for Recording {
        fn build_initial(
            &mut self,
            cx: &mut DecoderContext<'_>,
        ) -> Result<Option<Value>, DecodeError> {
            self.log.borrow_mut().steps.push((self.element, Stage::Initial));
            if self.asks_for_itself {
                // Asking for our own initial value from inside it.
                let me = cx.decoder_for(Some(self.element))?;
                cx.ensure_initial(me)?;
            }
            Ok(Some(Value::Int(self.element.index() as i32)))
        }

        fn build_comparable(
            &mut self,
            cx: &mut DecoderContext<'_>,
        ) -> Result<Vec<DecoderId>, DecodeError> {
            self.log.borrow_mut().steps.push((self.element, Stage::Comparable));
            self.peers(cx)
        }

        fn build_complete(
            &mut self,
            cx: &mut DecoderContext<'_>,
        ) -> Result<Vec<DecoderId>, DecodeError> {
            self.log.borrow_mut().steps.push((self.element, Stage::Complete));
            self.peers(cx)
        }
    }

    /// Three objects in a ring: a -> b -> c -> a.
    fn ring() -> (jser_stream::Arena, [ElementId; 3]) {
        let mut b = GraphBuilder::new();
        let class = b.class_desc("Ring", 1, ClassFlags::SERIALIZABLE).unwrap();
        b.add_field(class, "next", "LRing;").unwrap();
        let nodes = [
            b.object(class).unwrap(),
            b.object(class).unwrap(),
            b.object(class).unwrap(),
        ];
        for i in 0..3 {
            b.set_field(nodes[i], "next", FieldValue::Object(Some(nodes[(i + 1) % 3])))
                .unwrap();
        }
        (b.finish(), nodes)
    }

    fn registry(log: &Rc<RefCell<Log>>, asks_for_itself: bool) -> Registry {
        let mut registry = Registry::new();
        let log = log.clone();
        registry.register("Ring", move |_cx, element| {
            Ok(Box::new(Recording {
                element,
                log: log.clone(),
                asks_for_itself,
            }))
        });
        registry
    }

    #[test]
    fn test_cyclic_batches_step_each_member_once() {
        let log = Rc::new(RefCell::new(Log::default()));
        let registry = registry(&log, false);
        let (arena, nodes) = ring();
        let mut state = DecoderState::new();
        let mut cx = DecoderContext::new(&arena, &registry, &mut state);

        let root = cx.decoder_for(Some(nodes[0])).unwrap();
        assert_eq!(cx.stage(root).unwrap(), Stage::Unstarted);
        assert_eq!(cx.value(root), Err(DecodeError::Unstarted(root)));
        assert_eq!(cx.get_complete(root).unwrap(), Value::Int(nodes[0].index() as i32));

        let steps = &log.borrow().steps;
        for stage in [Stage::Initial, Stage::Comparable, Stage::Complete] {
            let mut seen: Vec<ElementId> = steps
                .iter()
                .filter(|(_, s)| *s == stage)
                .map(|(e, _)| *e)
                .collect();
            seen.sort();
            assert_eq!(seen, nodes.to_vec(), "{stage:?} steps");
        }
        for node in nodes {
            let id = cx.decoder_for(Some(node)).unwrap();
            assert_eq!(cx.stage(id).unwrap(), Stage::Complete);
        }
    }

    #[test]
    fn test_stages_never_regress() {
        let log = Rc::new(RefCell::new(Log::default()));
        let registry = registry(&log, false);
        let (arena, nodes) = ring();
        let mut state = DecoderState::new();
        let mut cx = DecoderContext::new(&arena, &registry, &mut state);

        let id = cx.decoder_for(Some(nodes[1])).unwrap();
        let first = cx.get_comparable(id).unwrap();
        assert_eq!(cx.stage(id).unwrap(), Stage::Comparable);
        let again = cx.get_comparable(id).unwrap();
        assert_eq!(first, again);
        cx.get_complete(id).unwrap();
        cx.get_complete(id).unwrap();
        cx.ensure_comparable(id).unwrap();
        cx.ensure_initial(id).unwrap();
        assert_eq!(cx.stage(id).unwrap(), Stage::Complete);
        assert_eq!(log.borrow().steps.len(), 9);
    }

    #[test]
    fn test_reentrant_initial_is_an_error() {
        let log = Rc::new(RefCell::new(Log::default()));
        let registry = registry(&log, true);
        let (arena, nodes) = ring();
        let mut state = DecoderState::new();
        let mut cx = DecoderContext::new(&arena, &registry, &mut state);

        let id = cx.decoder_for(Some(nodes[0])).unwrap();
        assert_eq!(
            cx.ensure_initial(id),
            Err(DecodeError::ReentrantTransition(id))
        );
    }

    #[test]
    fn test_null_finishes_at_initial() {
        let registry = Registry::new();
        let arena = jser_stream::Arena::new();
        let mut state = DecoderState::new();
        let mut cx = DecoderContext::new(&arena, &registry, &mut state);
        let id = cx.decoder_for(None).unwrap();
        assert_eq!(cx.get_initial(id).unwrap(), Value::Null);
        assert_eq!(cx.stage(id).unwrap(), Stage::Complete);
        assert_eq!(cx.decoder_for(None).unwrap(), id);
    }

    #[test]
    fn test_unknown_class() {
        let registry = Registry::new();
        let (arena, nodes) = ring();
        let mut state = DecoderState::new();
        let mut cx = DecoderContext::new(&arena, &registry, &mut state);
        assert_eq!(
            cx.decoder_for(Some(nodes[0])),
            Err(DecodeError::UnknownClass("Ring".into()))
        );
    }
}
