use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Interned string handle. Terminals and rule names compare by symbol,
/// never by string contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(pub u32);

/// Two-way string intern table. Symbols are dense indexes into `strings`.
#[derive(Debug, Default, Clone)]
pub struct Interner {
    ids: FxHashMap<String, Sym>,
    strings: Vec<Rc<String>>,
}

impl Interner {
    pub fn intern(&mut self, text: &str) -> Sym {
        if let Some(sym) = self.ids.get(text) {
            return *sym;
        }
        let sym = Sym(self.strings.len() as u32);
        self.strings.push(Rc::new(text.to_string()));
        self.ids.insert(text.to_string(), sym);
        sym
    }

    /// Symbol for `text` if it has ever been interned.
    pub fn lookup(&self, text: &str) -> Option<Sym> {
        self.ids.get(text).copied()
    }

    pub fn resolve(&self, sym: Sym) -> &str {
        &self.strings[sym.0 as usize]
    }

    pub fn resolve_rc(&self, sym: Sym) -> Rc<String> {
        Rc::clone(&self.strings[sym.0 as usize])
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }
}
