//! Entity model and platform configuration shared by the integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDateTime;
use onebridge_core::{
    Entity, EntityKind, Handle, Reference, Rows, TypeRegistry, ValueSource, entity, enumeration,
};
use onebridge_engine::{ContextConfig, DataContext};
use uuid::Uuid;

use crate::memory::{MemoryHost, ObjectSchema};

enumeration! {
    pub enum OrderStatus: "OrderStatuses" { Draft, Confirmed, Closed }
}

entity! {
    pub struct Counterparty: Catalogs("Counterparties") {
        id: Option<Uuid> = "Id",
        code: String = "Code",
        name: String = "Description",
        inn: String = "INN",
        parent: Reference<Counterparty> = "Parent",
    }
}

entity! {
    pub struct OrderLine {
        line_number: i64 = "LineNumber",
        product: String = "Product",
        quantity: i64 = "Quantity",
        price: f64 = "Price",
    }
}

entity! {
    pub struct Order: Documents("Order") {
        id: Option<Uuid> = "Id",
        number: String = "Number",
        date: Option<NaiveDateTime> = "Date",
        posted: bool = "Posted",
        counterparty: Reference<Counterparty> = "Counterparty",
        status: Option<OrderStatus> = "Status",
        total: f64 = "Total",
        lines: Rows<OrderLine> = "Lines",
    }
}

entity! {
    /// Register record keyed by product and currency.
    pub struct Price: InformationRegisters("Prices") {
        product: String = "Product",
        currency: String = "Currency",
        price: f64 = "Price",
        amount: f64 = "Amount",
    }
}

entity! {
    /// A catalog mapped without an identity field.
    pub struct Memo: Catalogs("Memos") {
        title: String = "Description",
    }
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Counterparty>()
        .register::<Order>()
        .register::<OrderLine>()
        .register::<Price>()
        .register::<Memo>();
    registry
}

/// Platform with the configuration objects the fixture entities map to.
pub fn platform() -> MemoryHost {
    MemoryHost::new()
        .with_object(
            "Catalog.Counterparties",
            ObjectSchema::attributes(&["INN", "Parent"]),
        )
        .with_object("Catalog.Memos", ObjectSchema::attributes(&[]))
        .with_object("Catalog.Warehouses", ObjectSchema::attributes(&["Address"]))
        .with_object(
            "Document.Order",
            ObjectSchema::attributes(&["Date", "Counterparty", "Status", "Total"])
                .with_table_section("Lines"),
        )
        .with_object(
            "InformationRegister.Prices",
            ObjectSchema::register(&["Product", "Currency"], &["Price", "Amount"], &[]),
        )
        .with_enum("OrderStatuses", &["Draft", "Confirmed", "Closed"])
}

pub fn context() -> DataContext<MemoryHost> {
    DataContext::new(platform(), registry(), ContextConfig::default())
}

/// Typed shell bound to an object that already exists on the platform.
pub fn existing<T: EntityKind>(handle: Handle) -> Rc<RefCell<T>> {
    let mut entity = T::default();
    entity.controller_mut().bind(ValueSource::read_only(handle));
    entity.shared()
}
