//! Static metadata for every cached kind.

use homesync_core::{EntityKind, Row};
use serde_json::Value;

use crate::error::TransportError;

/// Where the rows sit in a collection payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The payload is the JSON array of rows.
    Array,
    /// The payload is an object; the rows are the array under this field.
    Nested(&'static str),
}

/// How to fetch and parse one kind.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Collection endpoint, relative to the API base URL.
    pub path: &'static str,
    pub shape: PayloadShape,
    /// Field every row must carry, if any.
    pub key: Option<&'static str>,
}

impl EntityDescriptor {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Preference key holding the kind's change-token.
    pub fn token_key(&self) -> String {
        self.kind.token_key()
    }

    /// Parse a collection payload into rows.
    pub fn parse(&self, payload: &[u8]) -> Result<Vec<Row>, TransportError> {
        let value: Value = serde_json::from_slice(payload).map_err(|e| self.malformed(e))?;

        let rows = match (self.shape, value) {
            (PayloadShape::Array, rows) => rows,
            (PayloadShape::Nested(field), Value::Object(mut object)) => object
                .remove(field)
                .ok_or_else(|| self.malformed(format!("missing field `{}`", field)))?,
            (PayloadShape::Nested(_), _) => return Err(self.malformed("expected a JSON object")),
        };

        let Value::Array(rows) = rows else {
            return Err(self.malformed("expected a JSON array"));
        };

        rows.into_iter()
            .enumerate()
            .map(|(index, row)| match row {
                Value::Object(row) => match self.key {
                    Some(key) if !row.contains_key(key) => {
                        Err(self.malformed(format!("row {} has no `{}`", index, key)))
                    }
                    _ => Ok(row),
                },
                _ => Err(self.malformed(format!("row {} is not an object", index))),
            })
            .collect()
    }

    fn malformed(&self, detail: impl std::fmt::Display) -> TransportError {
        TransportError::ParseError(format!("{}: {}", self.kind, detail))
    }
}

const fn object(kind: EntityKind, path: &'static str) -> EntityDescriptor {
    EntityDescriptor {
        kind,
        path,
        shape: PayloadShape::Array,
        key: Some("id"),
    }
}

const fn keyed(kind: EntityKind, path: &'static str, key: &'static str) -> EntityDescriptor {
    EntityDescriptor {
        kind,
        path,
        shape: PayloadShape::Array,
        key: Some(key),
    }
}

/// One descriptor per kind, in `EntityKind::ALL` order.
pub static DESCRIPTORS: [EntityDescriptor; 30] = [
    object(EntityKind::Products, "objects/products"),
    object(EntityKind::ProductGroups, "objects/product_groups"),
    object(EntityKind::ProductBarcodes, "objects/product_barcodes"),
    object(EntityKind::QuantityUnits, "objects/quantity_units"),
    object(EntityKind::QuantityUnitConversions, "objects/quantity_unit_conversions"),
    object(EntityKind::Locations, "objects/locations"),
    object(EntityKind::Stores, "objects/shopping_locations"),
    keyed(EntityKind::Stock, "stock", "product_id"),
    object(EntityKind::StockEntries, "objects/stock"),
    EntityDescriptor {
        kind: EntityKind::MissingProducts,
        path: "stock/volatile",
        shape: PayloadShape::Nested("missing_products"),
        key: Some("id"),
    },
    object(EntityKind::ShoppingLists, "objects/shopping_lists"),
    object(EntityKind::ShoppingListItems, "objects/shopping_list"),
    object(EntityKind::Tasks, "objects/tasks"),
    object(EntityKind::TaskCategories, "objects/task_categories"),
    object(EntityKind::Chores, "objects/chores"),
    keyed(EntityKind::ChoreDetails, "chores", "chore_id"),
    object(EntityKind::Recipes, "objects/recipes"),
    object(EntityKind::RecipePositions, "objects/recipes_pos"),
    object(EntityKind::RecipeNestings, "objects/recipes_nestings"),
    keyed(EntityKind::RecipeFulfillment, "recipes/fulfillment", "recipe_id"),
    object(EntityKind::MealPlan, "objects/meal_plan"),
    object(EntityKind::MealPlanSections, "objects/meal_plan_sections"),
    object(EntityKind::Batteries, "objects/batteries"),
    object(EntityKind::Equipment, "objects/equipment"),
    object(EntityKind::Userfields, "objects/userfields"),
    object(EntityKind::Userentities, "objects/userentities"),
    object(EntityKind::Userobjects, "objects/userobjects"),
    object(EntityKind::Users, "users"),
    keyed(EntityKind::ProductsLastPurchased, "objects/products_last_purchased", "product_id"),
    keyed(EntityKind::ProductsAveragePrice, "objects/products_average_price", "product_id"),
];

/// Descriptor of `kind`.
pub fn descriptor(kind: EntityKind) -> &'static EntityDescriptor {
    &DESCRIPTORS[kind as usize]
}
