use std::collections::HashSet;

use shared::{
    domain::{default_categories, Category, CategoryId},
    error::{LaundryError, LaundryResult},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub order: Option<i64>,
}

/// Ordered set of categories offered when a new record is entered. Records
/// keep their own snapshots, so nothing here reaches back into history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new(default_categories())
    }
}

impl CategoryRegistry {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn list(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn add(&mut self, name: &str, icon: &str) -> LaundryResult<Category> {
        let name = required_field("category name", name)?;
        let icon = required_field("category icon", icon)?;

        let mut id = CategoryId::generate();
        while self.get(&id).is_some() {
            id = CategoryId::generate();
        }

        let category = Category {
            id,
            name,
            icon,
            order: self.categories.len() as i64 + 1,
        };
        self.categories.push(category.clone());
        Ok(category)
    }

    /// Returns whether a category matched. Unknown ids are not an error.
    pub fn update(&mut self, id: &CategoryId, patch: CategoryPatch) -> LaundryResult<bool> {
        let name = patch
            .name
            .as_deref()
            .map(|name| required_field("category name", name))
            .transpose()?;
        let icon = patch
            .icon
            .as_deref()
            .map(|icon| required_field("category icon", icon))
            .transpose()?;

        let Some(category) = self.categories.iter_mut().find(|c| &c.id == id) else {
            return Ok(false);
        };
        if let Some(name) = name {
            category.name = name;
        }
        if let Some(icon) = icon {
            category.icon = icon;
        }
        if let Some(order) = patch.order {
            category.order = order;
        }
        Ok(true)
    }

    pub fn delete(&mut self, id: &CategoryId) -> bool {
        let before = self.categories.len();
        self.categories.retain(|category| &category.id != id);
        self.categories.len() != before
    }

    /// Replaces the collection with `ordered`, numbering `order` by position.
    pub fn reorder(&mut self, ordered: Vec<Category>) -> LaundryResult<()> {
        ensure_unique_ids(&ordered)
            .map_err(|id| LaundryError::validation(format!("category {id} listed twice")))?;

        self.categories = ordered
            .into_iter()
            .enumerate()
            .map(|(index, category)| Category {
                order: index as i64 + 1,
                ..category
            })
            .collect();
        Ok(())
    }

    pub fn reset_to_defaults(&mut self) {
        self.categories = default_categories();
    }

    /// Wholesale replace with ids and orders kept verbatim.
    pub fn import_all(&mut self, categories: Vec<Category>) {
        self.categories = categories;
    }
}

fn required_field(label: &str, value: &str) -> LaundryResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LaundryError::validation(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn ensure_unique_ids(categories: &[Category]) -> Result<(), CategoryId> {
    let mut seen = HashSet::new();
    for category in categories {
        if !seen.insert(&category.id) {
            return Err(category.id.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/categories_tests.rs"]
mod tests;
