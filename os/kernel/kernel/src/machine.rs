//! Bare-metal bring-up on the executing CPU.

use crate::{BootError, MemorySystem};
use kernel_ports::X86Ports;
use kernel_qemu::QemuLogger;
use kernel_registers::X86ControlRegisters;
use kernel_sync::{SpinLock, SyncOnceCell, X86Interrupts};
use kernel_vmem::{DirectMemory, FaultCode, PageFaultError};
use log::{LevelFilter, error, warn};

pub type KernelMemory = MemorySystem<'static, DirectMemory, X86ControlRegisters>;

// SAFETY: the debug console port is only written by this logger.
static LOGGER: QemuLogger<X86Ports> =
    QemuLogger::new(unsafe { X86Ports::new() }, LevelFilter::Debug);

// SAFETY: everything in this module runs at CPL 0.
static IRQ: X86Interrupts = unsafe { X86Interrupts::new() };

static MEMORY: SyncOnceCell<SpinLock<KernelMemory>> = SyncOnceCell::new();

/// Installs the logger and brings up memory.
///
/// # Errors
/// [`BootError::AlreadyBooted`] on a second call, else see
/// [`MemorySystem::init`].
///
/// # Safety
/// See [`MemorySystem::init`]; must run at CPL 0.
pub unsafe fn boot() -> Result<(), BootError> {
    if let Err(e) = LOGGER.init() {
        warn!("keeping the installed logger: {e}");
    }

    if MEMORY.get().is_some() {
        return Err(BootError::AlreadyBooted);
    }
    // SAFETY: forwarded to the caller; CPL 0 makes the control registers ours.
    let memory = unsafe { MemorySystem::init(DirectMemory, X86ControlRegisters::new()) }
        .inspect_err(|e| error!("memory bring-up failed: {e}"))?;
    MEMORY
        .set(SpinLock::new(memory))
        .map_err(|_| BootError::AlreadyBooted)
}

/// Page-fault exception body.
///
/// # Errors
/// [`PageFaultError::NotLoaded`] before [`boot`]; otherwise see
/// [`MemorySystem::handle_page_fault`].
pub fn page_fault(code: FaultCode) -> Result<(), PageFaultError> {
    let memory = MEMORY.get().ok_or(PageFaultError::NotLoaded)?;
    memory.lock_irq(&IRQ).handle_page_fault(code)
}

/// Runs `f` with exclusive access to the kernel's memory system and
/// interrupts masked.
pub fn with_memory<T>(f: impl FnOnce(&mut KernelMemory) -> T) -> Option<T> {
    MEMORY.get().map(|memory| f(&mut memory.lock_irq(&IRQ)))
}
