use onebridge_core::{Entity, EntityKind, EntityRef, Reference, RemoteValue, Rows, SyncList};
use onebridge_engine::EngineError;
use onebridge_harness::Call;
use onebridge_harness::fixtures::{
    Counterparty, Memo, Order, OrderLine, OrderStatus, Price, context, existing,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn line(product: &str, quantity: i64) -> EntityRef {
    let mut line = OrderLine::default();
    line.set_product(product.into());
    line.set_quantity(quantity);
    line.shared()
}

fn product_of(row: &EntityRef) -> String {
    row.borrow()
        .downcast_ref::<OrderLine>()
        .map(|l| l.product().clone())
        .unwrap_or_default()
}

// ============================================================================
// Graph save
// ============================================================================

#[test]
fn new_order_is_created_written_and_read_back() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let ctx = context();
    let line_a = line("LineA", 1);
    let order = {
        let mut order = Order::default();
        order.set_number("X-1".into());
        order.set_total(100.0);
        order.set_lines(Rows::from_items(vec![line_a.clone()]));
        order.shared()
    };

    ctx.save(&order)?;

    ctx.with_host(|host| {
        assert_eq!(host.invoked("CreateDocument"), 1);
        assert_eq!(host.invoked("Add"), 1);
        assert_eq!(host.invoked("Write"), 1);
        assert_eq!(host.writes()[0].object, "Document.Order");
        assert_eq!(host.writes()[0].argument, RemoteValue::Text("Write".into()));

        let sets: Vec<&str> = host
            .calls()
            .iter()
            .filter_map(|c| match c {
                Call::Set(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(sets, ["Number", "Total", "Product", "Quantity"]);
        assert_eq!(
            host.calls().iter().filter(|c| **c == Call::Get("Ref".into())).count(),
            1
        );
    });

    let order = order.borrow();
    assert!(!order.controller().is_dirty());
    assert!(!order.controller().is_new());
    assert_eq!(order.number(), "X-1");

    let reference = order
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;
    let uuid = ctx.with_host(|host| host.uuid_of(reference));
    assert!(uuid.is_some());
    assert_eq!(*order.id(), uuid);

    let line_a = line_a.borrow();
    assert!(!line_a.controller().is_dirty());
    assert_eq!(line_a.downcast_ref::<OrderLine>().map(|l| *l.line_number()), Some(1));

    Ok(())
}

#[test]
fn referenced_entities_are_saved_first() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let counterparty = {
        let mut c = Counterparty::default();
        c.set_name("Acme".into());
        c.set_inn("7701000000".into());
        c.shared()
    };
    let order = {
        let mut order = Order::default();
        order.set_counterparty(Reference::new(&counterparty));
        order.set_status(Some(OrderStatus::Confirmed));
        order.shared()
    };

    ctx.save(&order)?;

    let counterparty = counterparty.borrow();
    assert!(!counterparty.controller().is_dirty());
    assert_eq!(counterparty.code(), "000000001");
    assert!(counterparty.id().is_some());

    let counterparty_ref = counterparty
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("counterparty is not bound")?;
    let order_ref = order
        .borrow()
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;

    ctx.with_host(|host| -> Result<(), Box<dyn std::error::Error>> {
        let objects: Vec<&str> = host.writes().iter().map(|w| w.object.as_str()).collect();
        assert_eq!(objects, ["Catalog.Counterparties", "Document.Order"]);
        assert_eq!(
            host.property(order_ref, "Counterparty"),
            Some(RemoteValue::Handle(counterparty_ref))
        );
        let confirmed = host.enum_value("OrderStatuses", "Confirmed")?;
        assert_eq!(
            host.property(order_ref, "Status"),
            Some(RemoteValue::Handle(confirmed))
        );
        Ok(())
    })?;

    Ok(())
}

#[test]
fn saving_a_clean_entity_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let stored = ctx.with_host(|host| {
        host.insert_record(
            "Catalog.Counterparties",
            vec![("Description", RemoteValue::Text("Acme".into()))],
        )
    })?;

    let counterparty = existing::<Counterparty>(stored);
    ctx.save(&counterparty)?;
    ctx.save(&Counterparty::default().shared())?;

    ctx.with_host(|host| {
        assert!(host.calls().is_empty());
        assert!(host.writes().is_empty());
    });
    Ok(())
}

#[test]
fn second_save_without_changes_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let counterparty = Counterparty::default().shared();
    counterparty.borrow_mut().set_name("Acme".into());

    ctx.save(&counterparty)?;
    ctx.with_host(|host| host.reset_log());
    ctx.save(&counterparty)?;

    ctx.with_host(|host| assert_eq!(host.invoked("Write"), 0));
    Ok(())
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn self_reference_is_a_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let counterparty = Counterparty::default().shared();
    counterparty.borrow_mut().set_name("Loop".into());
    let parent = Reference::new(&counterparty);
    counterparty.borrow_mut().set_parent(parent);

    match ctx.save(&counterparty) {
        Err(EngineError::CycleDetected { entity, chain }) => {
            assert_eq!(entity, "Counterparty");
            assert_eq!(chain, "Counterparty->Parent->Counterparty");
        }
        other => panic!("expected a cycle, got {other:?}"),
    }

    ctx.with_host(|host| assert_eq!(host.invoked("Write"), 0));
    assert!(counterparty.borrow().controller().is_dirty());
    Ok(())
}

#[test]
fn mutual_references_are_a_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let a = Counterparty::default().shared();
    let b = Counterparty::default().shared();
    a.borrow_mut().set_parent(Reference::new(&b));
    b.borrow_mut().set_parent(Reference::new(&a));

    let err = ctx.save(&a).unwrap_err();
    assert!(matches!(err, EngineError::CycleDetected { .. }));
    assert_eq!(
        err.to_string(),
        "cycle detected for entity type [Counterparty]: \
         [Counterparty->Parent->Counterparty->Parent->Counterparty]"
    );
    ctx.with_host(|host| assert_eq!(host.invoked("Write"), 0));
    Ok(())
}

// ============================================================================
// Documents and registers
// ============================================================================

#[test]
fn posted_document_is_unposted_and_reposted() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let stored = ctx.with_host(|host| {
        host.insert_record(
            "Document.Order",
            vec![
                ("Number", RemoteValue::Text("000000042".into())),
                ("Posted", RemoteValue::Boolean(true)),
            ],
        )
    })?;

    let order = existing::<Order>(stored);
    order.borrow_mut().set_total(5.0);
    ctx.save(&order)?;

    ctx.with_host(|host| {
        let arguments: Vec<_> = host.writes().iter().map(|w| w.argument.clone()).collect();
        assert_eq!(
            arguments,
            [
                RemoteValue::Text("UndoPosting".into()),
                RemoteValue::Text("Posting".into()),
            ]
        );
        assert_eq!(host.invoked("GetObject"), 1);
        assert_eq!(host.property(stored, "Posted"), Some(RemoteValue::Boolean(true)));
    });
    assert_eq!(order.borrow().number(), "000000042");
    Ok(())
}

#[test]
fn explicit_posting_is_a_write_mode_not_a_field() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let order = Order::default().shared();
    order.borrow_mut().set_total(1.0);
    order.borrow_mut().set_posted(true);

    ctx.save(&order)?;

    ctx.with_host(|host| {
        assert_eq!(host.writes().len(), 1);
        assert_eq!(host.writes()[0].argument, RemoteValue::Text("Posting".into()));
        assert!(!host.calls().contains(&Call::Set("Posted".into())));
    });
    Ok(())
}

#[test]
fn read_only_register_record_is_back_filled() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let original = ctx.with_host(|host| {
        host.insert_record(
            "InformationRegister.Prices",
            vec![
                ("Product", RemoteValue::Text("Widget".into())),
                ("Currency", RemoteValue::Text("EUR".into())),
                ("Price", RemoteValue::Number(4.0)),
                ("Amount", RemoteValue::Number(3.0)),
            ],
        )
    })?;

    let record = existing::<Price>(original);
    record.borrow_mut().set_amount(10.0);
    ctx.save(&record)?;

    let source = record
        .borrow()
        .controller()
        .value_source()
        .copied()
        .ok_or("record is not bound")?;
    assert!(source.is_writable());
    assert_ne!(source.backing_handle(), original);

    let written = source.backing_handle();
    ctx.with_host(|host| {
        assert_eq!(host.invoked("CreateRecordManager"), 1);
        assert_eq!(host.writes()[0].argument, RemoteValue::Boolean(true));
        assert_eq!(host.property(written, "Amount"), Some(RemoteValue::Number(10.0)));
        assert_eq!(host.property(written, "Currency"), Some(RemoteValue::Text("EUR".into())));
        assert_eq!(host.property(written, "Product"), Some(RemoteValue::Text("Widget".into())));
        assert_eq!(host.property(written, "Price"), Some(RemoteValue::Number(4.0)));
        host.reset_log();
    });

    record.borrow_mut().set_price(4.5);
    ctx.save(&record)?;
    ctx.with_host(|host| {
        assert_eq!(host.invoked("CreateRecordManager"), 0);
        assert_eq!(host.writes()[0].handle, written);
        assert_eq!(host.property(written, "Price"), Some(RemoteValue::Number(4.5)));
    });
    Ok(())
}

// ============================================================================
// Table sections
// ============================================================================

#[test]
fn sync_list_replay_preserves_order() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let stored = ctx.with_host(|host| host.insert_record("Document.Order", vec![]))?;
    let order = existing::<Order>(stored);

    let mut lines = SyncList::new();
    lines.insert(0, line("a", 1))?;
    lines.insert(1, line("b", 2))?;
    lines.remove(0)?;
    order.borrow_mut().set_lines(Rows::synced(lines));

    ctx.save(&order)?;

    ctx.with_host(|host| {
        let rows = host.section_rows(stored, "Lines");
        assert_eq!(rows.len(), 1);
        assert_eq!(host.property(rows[0], "Product"), Some(RemoteValue::Text("b".into())));
        assert_eq!(host.invoked("Insert"), 2);
        assert_eq!(host.invoked("Delete"), 1);
        assert_eq!(host.invoked("Clear"), 0);
    });

    let order = order.borrow();
    let replayed = order.lines().sync_list().map(|l| l.commands().len());
    assert_eq!(replayed, Some(0));
    assert_eq!(order.lines().len(), 1);
    assert_eq!(product_of(&order.lines().items()[0]), "b");
    Ok(())
}

#[test]
fn sync_list_moves_existing_rows() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_lines(Rows::from_items(vec![line("first", 1), line("second", 2)]));
    ctx.save(&order)?;

    let mut lines = order.borrow().lines().clone().into_sync_list();
    lines.move_item(0, 1)?;
    order.borrow_mut().set_lines(Rows::synced(lines));
    ctx.save(&order)?;

    let reference = order
        .borrow()
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;
    ctx.with_host(|host| {
        let products: Vec<_> = host
            .section_rows(reference, "Lines")
            .into_iter()
            .map(|row| host.property(row, "Product"))
            .collect();
        assert_eq!(
            products,
            [
                Some(RemoteValue::Text("second".into())),
                Some(RemoteValue::Text("first".into())),
            ]
        );
        assert_eq!(host.invoked("Move"), 1);
    });
    Ok(())
}

#[test]
fn edited_row_rewrites_its_section() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let row = OrderLine::default().shared();
    row.borrow_mut().set_product("Widget".into());
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_lines(Rows::from_items(vec![row.clone() as EntityRef]));
    ctx.save(&order)?;
    ctx.with_host(|host| host.reset_log());

    row.borrow_mut().set_quantity(5);
    ctx.save(&order)?;

    let reference = order
        .borrow()
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;
    ctx.with_host(|host| {
        assert_eq!(host.invoked("Write"), 1);
        let rows = host.section_rows(reference, "Lines");
        assert_eq!(rows.len(), 1);
        assert_eq!(host.property(rows[0], "Quantity"), Some(RemoteValue::Integer(5)));
    });
    assert!(!row.borrow().controller().is_dirty());
    Ok(())
}

#[test]
fn synced_row_edited_in_place_is_updated() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let row = OrderLine::default().shared();
    row.borrow_mut().set_product("Widget".into());
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_lines(Rows::from_items(vec![row.clone() as EntityRef]));
    ctx.save(&order)?;

    let lines = order.borrow().lines().clone().into_sync_list();
    order.borrow_mut().set_lines(Rows::synced(lines));
    ctx.save(&order)?;
    ctx.with_host(|host| host.reset_log());

    row.borrow_mut().set_quantity(5);
    ctx.save(&order)?;

    let reference = order
        .borrow()
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;
    ctx.with_host(|host| {
        assert_eq!(host.invoked("Get"), 1);
        assert_eq!(host.invoked("Insert"), 0);
        assert_eq!(host.invoked("Clear"), 0);
        assert_eq!(host.invoked("Write"), 1);
        let rows = host.section_rows(reference, "Lines");
        assert_eq!(rows.len(), 1);
        assert_eq!(host.property(rows[0], "Quantity"), Some(RemoteValue::Integer(5)));
        assert_eq!(host.property(rows[0], "Product"), Some(RemoteValue::Text("Widget".into())));
    });
    assert!(!row.borrow().controller().is_dirty());
    assert!(!order.borrow().controller().is_dirty());
    let pending = order.borrow().lines().sync_list().map(|l| l.commands().len());
    assert_eq!(pending, Some(0));
    Ok(())
}

#[test]
fn updated_rows_are_written_in_place() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let first = OrderLine::default().shared();
    first.borrow_mut().set_product("first".into());
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_lines(Rows::from_items(vec![first.clone() as EntityRef, line("second", 2)]));
    ctx.save(&order)?;

    let reference = order
        .borrow()
        .controller()
        .value_source()
        .map(|s| s.backing_handle())
        .ok_or("order is not bound")?;
    let before = ctx.with_host(|host| host.section_rows(reference, "Lines"));
    ctx.with_host(|host| host.reset_log());

    first.borrow_mut().set_product("edited".into());
    let mut lines = order.borrow().lines().clone().into_sync_list();
    lines.update(0)?;
    lines.set(1, line("replacement", 9))?;
    order.borrow_mut().set_lines(Rows::synced(lines));
    ctx.save(&order)?;

    ctx.with_host(|host| {
        assert_eq!(host.invoked("Get"), 2);
        assert_eq!(host.invoked("Insert"), 0);
        assert_eq!(host.invoked("Add"), 0);
        assert_eq!(host.invoked("Clear"), 0);
        let rows = host.section_rows(reference, "Lines");
        assert_eq!(rows, before);
        assert_eq!(host.property(rows[0], "Product"), Some(RemoteValue::Text("edited".into())));
        assert_eq!(
            host.property(rows[1], "Product"),
            Some(RemoteValue::Text("replacement".into()))
        );
        assert_eq!(host.property(rows[1], "Quantity"), Some(RemoteValue::Integer(9)));
    });
    assert_eq!(product_of(&order.borrow().lines().items()[1]), "replacement");
    Ok(())
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn rejected_write_reports_object_and_argument() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    ctx.with_host(|host| host.fail_on("Write", "object is locked"));
    let counterparty = Counterparty::default().shared();
    counterparty.borrow_mut().set_name("Acme".into());

    match ctx.save(&counterparty) {
        Err(EngineError::WriteFailed {
            configuration_name,
            argument,
            ..
        }) => {
            assert_eq!(configuration_name, "Catalog.Counterparties");
            assert_eq!(argument, "Write");
        }
        other => panic!("expected a write failure, got {other:?}"),
    }
    assert!(counterparty.borrow().controller().is_dirty());
    Ok(())
}

#[test]
fn remote_errors_carry_the_save_path() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    ctx.with_host(|host| host.fail_on("Product", "read-only attribute"));
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_lines(Rows::from_items(vec![line("Widget", 1)]));

    match ctx.save(&order) {
        Err(EngineError::Remote { path, .. }) => {
            assert_eq!(path, "Order->Lines->0->OrderLine->Product");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
    ctx.with_host(|host| assert_eq!(host.invoked("Write"), 0));
    Ok(())
}

#[test]
fn catalog_without_id_field_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let memo = Memo::default().shared();
    memo.borrow_mut().set_title("note".into());

    match ctx.save(&memo) {
        Err(EngineError::MissingIdentityProperty(name)) => assert_eq!(name, "Catalog.Memos"),
        other => panic!("expected a missing id, got {other:?}"),
    }
    Ok(())
}

#[test]
fn never_saved_reference_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = context();
    let counterparty = Counterparty::default().shared();
    let order = Order::default().shared();
    order
        .borrow_mut()
        .set_counterparty(Reference::new(&counterparty));

    let err = ctx.save(&order).unwrap_err();
    assert!(matches!(err, EngineError::UnsavedReference("Counterparty")));
    Ok(())
}
