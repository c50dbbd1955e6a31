//! Outward interface of the core: one callback per resolved entity.
//! The core never reads backend output; a backend never mutates core
//! state. Errors bubble back through the dispatcher as fatal.

pub mod c;

use anyhow::Result;

use crate::model::aggregate::{Aggregate, Comment, Field};
use crate::model::constant::Constant;
use crate::model::entry::Entry;
use crate::model::enumeration::Enumeration;
use crate::model::item::Item;
use crate::model::module::Module;

pub trait Backend {
    /// Name this backend answers to in `--lang` and IF_LANGUAGE.
    fn language(&self) -> &str;

    fn module_begin(&mut self, module: &Module) -> Result<()>;
    fn module_end(&mut self, module: &Module) -> Result<()>;
    fn item(&mut self, module: &Module, item: &Item) -> Result<()>;
    fn constant(
        &mut self,
        module: &Module,
        constant: &Constant,
    ) -> Result<()>;
    fn enumeration(
        &mut self,
        module: &Module,
        def: &Enumeration,
    ) -> Result<()>;
    fn aggregate_begin(
        &mut self,
        module: &Module,
        agg: &Aggregate,
        depth: usize,
    ) -> Result<()>;
    fn member(
        &mut self,
        module: &Module,
        agg: &Aggregate,
        field: &Field,
        depth: usize,
    ) -> Result<()>;
    fn aggregate_end(
        &mut self,
        module: &Module,
        agg: &Aggregate,
        depth: usize,
    ) -> Result<()>;
    fn comment(
        &mut self,
        module: &Module,
        comment: &Comment,
        depth: usize,
    ) -> Result<()>;
    fn literal_line(&mut self, module: &Module, line: &str) -> Result<()>;
    fn entry(&mut self, module: &Module, entry: &Entry) -> Result<()>;
}

/// Emission switches shared by all backends, set from the CLI.
#[derive(Debug, Clone, Default)]
pub struct EmitConfig {
    pub header: bool,
    pub comments: bool,
    pub suppress_prefix: bool,
    pub suppress_tag: bool,
    pub copy_text: Option<String>,
}

impl EmitConfig {
    /// Rendered name of an item, aggregate or member: the tag sits
    /// between prefix and id.
    pub fn entity_name(
        &self,
        prefix: Option<&str>,
        tag: &str,
        id: &str,
    ) -> String {
        let mut name = String::new();
        if !self.suppress_prefix {
            if let Some(p) = prefix {
                name.push_str(p);
            }
        }
        if !self.suppress_tag && !tag.is_empty() {
            name.push_str(tag);
            name.push('_');
        }
        name.push_str(id);
        name
    }

    /// Rendered name of a constant: the tag trails the id, so derived
    /// size and mask constants come out as `<id>_s` / `<id>_m`.
    pub fn constant_name(
        &self,
        prefix: Option<&str>,
        id: &str,
        tag: &str,
    ) -> String {
        let mut name = String::new();
        if !self.suppress_prefix {
            if let Some(p) = prefix {
                name.push_str(p);
            }
        }
        name.push_str(id);
        if !self.suppress_tag && !tag.is_empty() {
            name.push('_');
            name.push_str(tag);
        }
        name
    }
}
