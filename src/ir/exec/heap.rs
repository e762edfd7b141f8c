use std::fmt;

use rustc_hash::FxHashMap;

use super::{ExecError, ExecResult, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

struct HeapObject {
    value: Value,
    /// Each field holds one reference to its object.
    fields: FxHashMap<String, ObjectId>,
    refcount: usize,
    freed: bool,
    /// Stack objects are not reference counted.
    on_stack: bool,
    /// Objects handed in by the caller start owned once.
    external: bool,
}

/// An object still referenced when execution finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leak {
    pub object: ObjectId,
    pub ty: String,
    pub refcount: usize,
}

/// Reference counted objects of one execution.
#[derive(Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn alloc(&mut self, value: Value, on_stack: bool) -> ObjectId {
        let id = ObjectId(self.objects.len());
        self.objects.push(HeapObject {
            value,
            fields: FxHashMap::default(),
            refcount: 0,
            freed: false,
            on_stack,
            external: false,
        });
        id
    }

    /// Allocate an object the caller holds one reference to.
    pub fn alloc_external(&mut self, value: Value) -> ObjectId {
        let id = self.alloc(value, false);
        let object = &mut self.objects[id.0];
        object.refcount = 1;
        object.external = true;
        id
    }

    /// Allocate an object already holding one reference, as an exception
    /// thrown by a callee does.
    pub fn alloc_owned(&mut self, value: Value) -> ObjectId {
        let id = self.alloc(value, false);
        self.objects[id.0].refcount = 1;
        id
    }

    fn live(&self, id: ObjectId) -> ExecResult<&HeapObject> {
        match self.objects.get(id.0) {
            Some(object) if !object.freed => Ok(object),
            _ => Err(ExecError::UseAfterFree(id)),
        }
    }

    pub fn value(&self, id: ObjectId) -> ExecResult<&Value> { Ok(&self.live(id)?.value) }

    pub fn set_value(&mut self, id: ObjectId, value: Value) -> ExecResult<()> {
        self.live(id)?;
        self.objects[id.0].value = value;
        Ok(())
    }

    /// The object in field `name` of `id`, if it was assigned.
    pub fn field(&self, id: ObjectId, name: &str) -> ExecResult<Option<ObjectId>> {
        Ok(self.live(id)?.fields.get(name).copied())
    }

    /// Point field `name` of `id` at `value`. Reference counts are left to
    /// the caller.
    pub fn set_field(&mut self, id: ObjectId, name: &str, value: Option<ObjectId>) -> ExecResult<()> {
        self.live(id)?;
        let fields = &mut self.objects[id.0].fields;
        match value {
            Some(value) => fields.insert(name.to_string(), value),
            None => fields.remove(name),
        };
        Ok(())
    }

    /// Drop every field of a stack object, releasing what they referred to.
    pub fn cleanup_fields(&mut self, id: ObjectId) -> ExecResult<()> {
        self.live(id)?;
        let fields = std::mem::take(&mut self.objects[id.0].fields);
        let mut held: Vec<ObjectId> = fields.into_values().collect();
        held.sort();
        for field in held {
            self.release(field)?;
        }
        Ok(())
    }

    pub fn refcount(&self, id: ObjectId) -> Option<usize> { self.objects.get(id.0).map(|o| o.refcount) }

    pub fn is_freed(&self, id: ObjectId) -> bool {
        self.objects.get(id.0).map(|o| o.freed).unwrap_or(false)
    }

    pub fn is_on_stack(&self, id: ObjectId) -> bool {
        self.objects.get(id.0).map(|o| o.on_stack).unwrap_or(false)
    }

    pub fn retain(&mut self, id: ObjectId) -> ExecResult<()> {
        self.live(id)?;
        let object = &mut self.objects[id.0];
        if !object.on_stack {
            object.refcount += 1;
        }
        Ok(())
    }

    /// Drop one reference. An object freed this way releases what its
    /// fields refer to.
    pub fn release(&mut self, id: ObjectId) -> ExecResult<()> {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(object) = self.objects.get_mut(id.0) else {
                return Err(ExecError::UseAfterFree(id));
            };
            if object.on_stack {
                continue;
            }
            if object.freed || object.refcount == 0 {
                return Err(ExecError::DoubleRelease(id));
            }
            object.refcount -= 1;
            if object.refcount == 0 {
                object.freed = true;
                let mut held: Vec<ObjectId> = std::mem::take(&mut object.fields).into_values().collect();
                held.sort_unstable_by(|a, b| b.cmp(a));
                pending.extend(held);
            }
        }
        Ok(())
    }

    /// Objects whose count did not return to what they started with.
    /// `returned` is the object handed back to the caller, which keeps one
    /// reference.
    pub fn leaks(&self, returned: Option<ObjectId>) -> Vec<Leak> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(_, object)| !object.on_stack && !object.freed)
            .filter_map(|(index, object)| {
                let id = ObjectId(index);
                let owned = usize::from(object.external) + usize::from(returned == Some(id));
                (object.refcount > owned).then(|| Leak {
                    object: id,
                    ty: object.value.type_name().to_string(),
                    refcount: object.refcount,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize { self.objects.len() }

    pub fn is_empty(&self) -> bool { self.objects.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_to_zero_frees() {
        let mut heap = Heap::default();
        let id = heap.alloc(Value::Integer(1), false);
        heap.retain(id).unwrap();
        heap.release(id).unwrap();
        assert!(heap.is_freed(id));
        assert_eq!(heap.release(id), Err(ExecError::DoubleRelease(id)));
        assert_eq!(heap.retain(id), Err(ExecError::UseAfterFree(id)));
    }

    #[test]
    fn test_leaks_respect_ownership() {
        let mut heap = Heap::default();
        let arg = heap.alloc_external(Value::Integer(1));
        let ret = heap.alloc(Value::Integer(2), false);
        let lost = heap.alloc(Value::Integer(3), false);
        heap.retain(ret).unwrap();
        heap.retain(lost).unwrap();

        let leaks = heap.leaks(Some(ret));
        assert_eq!(leaks.len(), 1);
        assert_eq!(leaks[0].object, lost);
        assert!(heap.leaks(Some(ret)).iter().all(|l| l.object != arg));
    }

    #[test]
    fn test_freeing_releases_fields() {
        let mut heap = Heap::default();
        let holder = heap.alloc(Value::Integer(1), false);
        let held = heap.alloc(Value::Integer(2), false);
        heap.retain(holder).unwrap();
        heap.retain(held).unwrap();
        heap.retain(held).unwrap();
        heap.set_field(holder, "value", Some(held)).unwrap();

        heap.release(holder).unwrap();
        assert!(heap.is_freed(holder));
        assert_eq!(heap.refcount(held), Some(1));
        assert!(!heap.is_freed(held));
    }

    #[test]
    fn test_stack_object_cleanup() {
        let mut heap = Heap::default();
        let holder = heap.alloc(Value::Integer(1), true);
        let held = heap.alloc(Value::Integer(2), false);
        heap.retain(held).unwrap();
        heap.set_field(holder, "value", Some(held)).unwrap();

        // releasing a stack object leaves its fields alone
        heap.release(holder).unwrap();
        assert_eq!(heap.field(holder, "value"), Ok(Some(held)));

        heap.cleanup_fields(holder).unwrap();
        assert!(heap.is_freed(held));
        assert_eq!(heap.field(holder, "value"), Ok(None));
        assert!(heap.leaks(None).is_empty());
    }

    #[test]
    fn test_stack_objects_are_not_counted() {
        let mut heap = Heap::default();
        let id = heap.alloc(Value::Boolean(true), true);
        heap.retain(id).unwrap();
        heap.release(id).unwrap();
        heap.release(id).unwrap();
        assert_eq!(heap.refcount(id), Some(0));
        assert!(heap.leaks(None).is_empty());
    }
}
