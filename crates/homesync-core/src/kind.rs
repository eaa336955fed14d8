use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A server-side collection cached locally as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Products,
    ProductGroups,
    ProductBarcodes,
    QuantityUnits,
    QuantityUnitConversions,
    Locations,
    Stores,
    Stock,
    StockEntries,
    MissingProducts,
    ShoppingLists,
    ShoppingListItems,
    Tasks,
    TaskCategories,
    Chores,
    ChoreDetails,
    Recipes,
    RecipePositions,
    RecipeNestings,
    RecipeFulfillment,
    MealPlan,
    MealPlanSections,
    Batteries,
    Equipment,
    Userfields,
    Userentities,
    Userobjects,
    Users,
    ProductsLastPurchased,
    ProductsAveragePrice,
}

impl EntityKind {
    /// Every kind, in a stable order.
    pub const ALL: [EntityKind; 30] = [
        EntityKind::Products,
        EntityKind::ProductGroups,
        EntityKind::ProductBarcodes,
        EntityKind::QuantityUnits,
        EntityKind::QuantityUnitConversions,
        EntityKind::Locations,
        EntityKind::Stores,
        EntityKind::Stock,
        EntityKind::StockEntries,
        EntityKind::MissingProducts,
        EntityKind::ShoppingLists,
        EntityKind::ShoppingListItems,
        EntityKind::Tasks,
        EntityKind::TaskCategories,
        EntityKind::Chores,
        EntityKind::ChoreDetails,
        EntityKind::Recipes,
        EntityKind::RecipePositions,
        EntityKind::RecipeNestings,
        EntityKind::RecipeFulfillment,
        EntityKind::MealPlan,
        EntityKind::MealPlanSections,
        EntityKind::Batteries,
        EntityKind::Equipment,
        EntityKind::Userfields,
        EntityKind::Userentities,
        EntityKind::Userobjects,
        EntityKind::Users,
        EntityKind::ProductsLastPurchased,
        EntityKind::ProductsAveragePrice,
    ];

    /// Stable name, used for table file names and manifest entries.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Products => "products",
            EntityKind::ProductGroups => "product_groups",
            EntityKind::ProductBarcodes => "product_barcodes",
            EntityKind::QuantityUnits => "quantity_units",
            EntityKind::QuantityUnitConversions => "quantity_unit_conversions",
            EntityKind::Locations => "locations",
            EntityKind::Stores => "stores",
            EntityKind::Stock => "stock",
            EntityKind::StockEntries => "stock_entries",
            EntityKind::MissingProducts => "missing_products",
            EntityKind::ShoppingLists => "shopping_lists",
            EntityKind::ShoppingListItems => "shopping_list_items",
            EntityKind::Tasks => "tasks",
            EntityKind::TaskCategories => "task_categories",
            EntityKind::Chores => "chores",
            EntityKind::ChoreDetails => "chore_details",
            EntityKind::Recipes => "recipes",
            EntityKind::RecipePositions => "recipe_positions",
            EntityKind::RecipeNestings => "recipe_nestings",
            EntityKind::RecipeFulfillment => "recipe_fulfillment",
            EntityKind::MealPlan => "meal_plan",
            EntityKind::MealPlanSections => "meal_plan_sections",
            EntityKind::Batteries => "batteries",
            EntityKind::Equipment => "equipment",
            EntityKind::Userfields => "userfields",
            EntityKind::Userentities => "userentities",
            EntityKind::Userobjects => "userobjects",
            EntityKind::Users => "users",
            EntityKind::ProductsLastPurchased => "products_last_purchased",
            EntityKind::ProductsAveragePrice => "products_average_price",
        }
    }

    /// Preference key under which the kind's change-token is persisted.
    pub fn token_key(self) -> String {
        format!("db_last_time_{}", self.name())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| StoreError::UnknownKind(s.to_string()))
    }
}
