use kernel_sync::{InterruptControl, IrqGuard, SoftInterrupts, SyncOnceCell};

#[test]
fn guard_restores_enabled_state() {
    let irq = SoftInterrupts::new(true);
    {
        let g = IrqGuard::new(&irq);
        assert!(g.were_enabled());
        assert!(!irq.enabled());
    }
    assert!(irq.enabled());
    assert_eq!(irq.disable_count(), 1);
}

#[test]
fn nested_guards_only_outermost_reenables() {
    let irq = SoftInterrupts::new(true);
    {
        let _outer = IrqGuard::new(&irq);
        {
            let inner = IrqGuard::new(&irq);
            assert!(!inner.were_enabled());
        }
        assert!(!irq.enabled(), "inner guard must not re-enable");
    }
    assert!(irq.enabled());
    assert_eq!(irq.disable_count(), 1);
}

#[test]
fn guard_works_through_trait_objects() {
    let irq = SoftInterrupts::new(true);
    let dynamic: &dyn InterruptControl = &irq;
    {
        let _g = IrqGuard::new(dynamic);
        assert!(!irq.enabled());
    }
    assert!(irq.enabled());
}

#[test]
fn once_cell_set_is_first_writer_wins() {
    let cell = SyncOnceCell::new();
    assert!(cell.get().is_none());
    assert_eq!(cell.set(1u32), Ok(()));
    assert_eq!(cell.set(2u32), Err(2));
    assert_eq!(cell.get(), Some(&1));
    assert_eq!(*cell.get_or_init(|| 3), 1);
}
