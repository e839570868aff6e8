//! Named, styled selections over a data source.

use std::fmt;
use std::sync::Arc;

use pm_core::{Error, EvalError, Record, Result};
use pm_data::{DataSource, Signature, SourceLoader, SourceRegistry};
use pm_expr::Expression;
use serde::Serialize;

use crate::style::{CategoryStyle, Color, Role};

/// One entry in a plot legend: a role, a style, a selection and the data
/// source it is evaluated over.
///
/// Immutable once built; shared between plot requests as `Arc<Category>`.
pub struct Category {
    name: String,
    role: Role,
    style: CategoryStyle,
    selection: Expression,
    source: Arc<DataSource>,
}

impl Category {
    /// Start building a category.
    pub fn builder(name: impl Into<String>, role: Role) -> CategoryBuilder {
        CategoryBuilder {
            name: name.into(),
            role,
            color: None,
            selection: None,
            style: None,
            source: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_data(&self) -> bool {
        self.role == Role::Data
    }

    pub fn style(&self) -> &CategoryStyle {
        &self.style
    }

    pub fn selection(&self) -> &Expression {
        &self.selection
    }

    pub fn source(&self) -> &Arc<DataSource> {
        &self.source
    }

    /// Whether `record` passes the selection. Evaluation errors count as
    /// not passing.
    pub fn passes(&self, record: &dyn Record) -> bool {
        match self.try_passes(record) {
            Ok(pass) => pass,
            Err(e) => {
                tracing::trace!(category = %self.name, event = record.index(), error = %e, "selection failed");
                false
            }
        }
    }

    /// Raw selection result.
    pub fn try_passes(&self, record: &dyn Record) -> std::result::Result<bool, EvalError> {
        self.selection.passes(record)
    }

    /// Legend metadata carried into artifacts.
    pub fn meta(&self) -> CategoryMeta {
        CategoryMeta { name: self.name.clone(), role: self.role, style: self.style.clone() }
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Category")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("selection", &self.selection.name())
            .field("source", self.source.signature())
            .finish()
    }
}

/// Legend entry as recorded in an artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMeta {
    pub name: String,
    pub role: Role,
    pub style: CategoryStyle,
}

enum SourceSpec {
    Open(Arc<DataSource>),
    Load(Signature, Arc<dyn SourceLoader>),
}

/// Builder for [`Category`].
pub struct CategoryBuilder {
    name: String,
    role: Role,
    color: Option<Color>,
    selection: Option<Expression>,
    style: Option<CategoryStyle>,
    source: Option<SourceSpec>,
}

impl CategoryBuilder {
    pub fn color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    /// Selection; defaults to always true.
    pub fn selection(mut self, selection: Expression) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Override the role-derived style.
    pub fn style(mut self, style: CategoryStyle) -> Self {
        self.style = Some(style);
        self
    }

    /// Read from the source with this signature, opening it through
    /// `loader` if the registry does not have it yet.
    pub fn source(mut self, signature: Signature, loader: Arc<dyn SourceLoader>) -> Self {
        self.source = Some(SourceSpec::Load(signature, loader));
        self
    }

    /// Read from an already opened source.
    pub fn data_source(mut self, source: Arc<DataSource>) -> Self {
        self.source = Some(SourceSpec::Open(source));
        self
    }

    /// Resolve the data source through `registry` and freeze the category.
    pub fn build(self, registry: &SourceRegistry) -> Result<Arc<Category>> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("category name must not be empty".to_string()));
        }
        let source = match self.source {
            Some(SourceSpec::Open(src)) => src,
            Some(SourceSpec::Load(sig, loader)) => registry.get_or_create(&sig, loader.as_ref())?,
            None => {
                return Err(Error::Configuration(format!("category '{}' has no data source", self.name)));
            }
        };
        let color = self.color.unwrap_or_default();
        let style = self.style.unwrap_or_else(|| CategoryStyle::for_role(self.role, color));
        let selection = self.selection.unwrap_or_else(Expression::always);

        tracing::debug!(
            category = %self.name,
            role = %self.role,
            source = %source.signature(),
            selection = %selection,
            "category built"
        );
        Ok(Arc::new(Category { name: self.name, role: self.role, style, selection, source }))
    }
}
