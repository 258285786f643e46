use std::collections::HashMap;

/// Variable name (with its `$`) to source text.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    variables: HashMap<String, String>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_string(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// The global heap plus one private frame per running copy-heap macro.
#[derive(Debug, Default)]
pub struct Environment {
    global: Heap,
    frames: Vec<Heap>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self) -> &Heap {
        &self.global
    }

    /// The heap that lines dispatched right now read and write.
    pub fn current(&self) -> &Heap {
        self.frames.last().unwrap_or(&self.global)
    }

    pub fn current_mut(&mut self) -> &mut Heap {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.global,
        }
    }

    pub fn push_frame(&mut self, heap: Heap) {
        self.frames.push(heap);
    }

    pub fn pop_frame(&mut self) -> Option<Heap> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
