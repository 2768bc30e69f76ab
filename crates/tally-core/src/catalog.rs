//! Entity catalog: the fixed set of data models a lookup may target.
//!
//! The catalog is the system's injection defense: every lookup must name an
//! allow-listed entity, every filter and projection must resolve against the
//! field lists here, and relation traversal is limited to the single-hop
//! links declared below. Nothing outside this module decides what a query
//! may touch.

use serde::{Deserialize, Serialize};

/// An allow-listed entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Order,
    OrderItem,
    Customer,
    Product,
}

impl EntityKind {
    /// Every allow-listed entity, in the order advertised to the model.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Order,
        EntityKind::OrderItem,
        EntityKind::Customer,
        EntityKind::Product,
    ];

    /// Resolve a lookup-spec model name. Unknown names are rejected before
    /// any query executes.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Order" => Some(EntityKind::Order),
            "OrderItem" => Some(EntityKind::OrderItem),
            "Customer" => Some(EntityKind::Customer),
            "Product" => Some(EntityKind::Product),
            _ => None,
        }
    }

    /// The name used in lookup specifications and the system prompt.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Order => "Order",
            EntityKind::OrderItem => "OrderItem",
            EntityKind::Customer => "Customer",
            EntityKind::Product => "Product",
        }
    }

    /// The backing table.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Order => "orders",
            EntityKind::OrderItem => "order_items",
            EntityKind::Customer => "customers",
            EntityKind::Product => "products",
        }
    }

    /// Queryable fields, in advertised order. Doubles as the projection
    /// allow-list.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Order => &["id", "customer_id", "status", "created_at", "requested_by"],
            EntityKind::OrderItem => &["id", "order_id", "product_id", "quantity", "price"],
            EntityKind::Customer => &["id", "name", "email", "phone", "created_at"],
            EntityKind::Product => &[
                "id",
                "name",
                "price",
                "category",
                "description",
                "stock_quantity",
            ],
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields().contains(&field)
    }

    /// Single-hop relations traversable from this entity: relation name,
    /// target entity, and the local foreign-key column.
    pub fn relations(&self) -> &'static [(&'static str, EntityKind, &'static str)] {
        match self {
            EntityKind::Order => &[("customer", EntityKind::Customer, "customer_id")],
            EntityKind::OrderItem => &[
                ("order", EntityKind::Order, "order_id"),
                ("product", EntityKind::Product, "product_id"),
            ],
            EntityKind::Customer | EntityKind::Product => &[],
        }
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<(EntityKind, &'static str)> {
        self.relations()
            .iter()
            .find(|(rel, _, _)| *rel == name)
            .map(|(_, target, fk)| (*target, *fk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_allow_list() {
        assert_eq!(EntityKind::from_name("Order"), Some(EntityKind::Order));
        assert_eq!(
            EntityKind::from_name("OrderItem"),
            Some(EntityKind::OrderItem)
        );
        assert_eq!(
            EntityKind::from_name("Customer"),
            Some(EntityKind::Customer)
        );
        assert_eq!(EntityKind::from_name("Product"), Some(EntityKind::Product));
    }

    #[test]
    fn test_from_name_rejects_unknown() {
        assert_eq!(EntityKind::from_name("Invoice"), None);
        assert_eq!(EntityKind::from_name("order"), None); // case-sensitive
        assert_eq!(EntityKind::from_name(""), None);
        assert_eq!(EntityKind::from_name("Order; DROP TABLE orders"), None);
    }

    #[test]
    fn test_name_round_trips() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_fields_contain_id() {
        for kind in EntityKind::ALL {
            assert!(kind.has_field("id"), "{} should expose id", kind.name());
        }
    }

    #[test]
    fn test_has_field() {
        assert!(EntityKind::Order.has_field("status"));
        assert!(!EntityKind::Order.has_field("stock_quantity"));
        assert!(EntityKind::Product.has_field("stock_quantity"));
        assert!(!EntityKind::Product.has_field("status"));
    }

    #[test]
    fn test_order_relation_to_customer() {
        let (target, fk) = EntityKind::Order.relation("customer").unwrap();
        assert_eq!(target, EntityKind::Customer);
        assert_eq!(fk, "customer_id");
    }

    #[test]
    fn test_order_item_relations() {
        let (target, fk) = EntityKind::OrderItem.relation("order").unwrap();
        assert_eq!(target, EntityKind::Order);
        assert_eq!(fk, "order_id");

        let (target, fk) = EntityKind::OrderItem.relation("product").unwrap();
        assert_eq!(target, EntityKind::Product);
        assert_eq!(fk, "product_id");
    }

    #[test]
    fn test_leaf_entities_have_no_relations() {
        assert!(EntityKind::Customer.relations().is_empty());
        assert!(EntityKind::Product.relations().is_empty());
        assert!(EntityKind::Order.relation("product").is_none());
    }
}
