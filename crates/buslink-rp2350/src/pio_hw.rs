//! [`PioHardware`] over PIO1 of the RP2350.

use buslink_hal::{PioHardware, PioIrq, SmRegisters};
use rp235x_hal::pac;

/// GPIO function select for PIO1.
const FUNCSEL_PIO1: u32 = 7;

const PAD_IE: u32 = 1 << 6;
const PAD_OD: u32 = 1 << 7;
const PAD_ISO: u32 = 1 << 8;

/// SM_RESTART and CLKDIV_RESTART fields of CTRL.
const CTRL_SM_RESTART_SHIFT: u32 = 4;
const CTRL_CLKDIV_RESTART_SHIFT: u32 = 8;

/// State-machine request flags start at bit 8 of IRQx_INTE.
const INTE_SM_FLAG_SHIFT: u32 = 8;

/// SHIFTCTRL.FJOIN_RX; toggling it twice empties both FIFOs.
const SHIFTCTRL_FJOIN_RX: u32 = 1 << 31;

const FSTAT_RXEMPTY_SHIFT: u32 = 8;
const FSTAT_TXFULL_SHIFT: u32 = 16;

fn pio1() -> &'static pac::pio0::RegisterBlock {
    // SAFETY: PIO1 is reset and handed over once, in `Rp2350Pio::new`. The
    // IRQ register is write-one-to-clear, so the interrupt-side handle never
    // races a read-modify-write.
    unsafe { &*pac::PIO1::ptr() }
}

pub struct Rp2350Pio {
    _regs: pac::PIO1,
}

impl Rp2350Pio {
    /// Take PIO1 out of reset.
    pub fn new(regs: pac::PIO1, resets: &mut pac::RESETS) -> Self {
        resets.reset().modify(|_, w| w.pio1().set_bit());
        resets.reset().modify(|_, w| w.pio1().clear_bit());
        while resets.reset_done().read().pio1().bit_is_clear() {}
        Rp2350Pio { _regs: regs }
    }
}

impl PioHardware for Rp2350Pio {
    fn block(&self) -> u8 {
        1
    }

    fn write_instruction(&mut self, address: u8, instruction: u16) {
        pio1()
            .instr_mem(address as usize)
            .write(|w| unsafe { w.bits(instruction as u32) });
    }

    fn set_enabled(&mut self, mask: u8, enabled: bool) {
        let mask = (mask & 0x0F) as u32;
        pio1().ctrl().modify(|r, w| unsafe {
            let bits = if enabled { r.bits() | mask } else { r.bits() & !mask };
            w.bits(bits)
        });
    }

    fn restart(&mut self, mask: u8) {
        let mask = (mask & 0x0F) as u32;
        pio1().ctrl().modify(|r, w| unsafe {
            w.bits(
                (r.bits() & 0x0F)
                    | mask << CTRL_SM_RESTART_SHIFT
                    | mask << CTRL_CLKDIV_RESTART_SHIFT,
            )
        });
    }

    fn write_sm_registers(&mut self, sm: u8, registers: &SmRegisters) {
        let regs = pio1().sm(sm as usize);
        regs.sm_clkdiv().write(|w| unsafe { w.bits(registers.clkdiv) });
        regs.sm_execctrl().write(|w| unsafe { w.bits(registers.execctrl) });
        regs.sm_shiftctrl().write(|w| unsafe { w.bits(registers.shiftctrl) });
        regs.sm_pinctrl().write(|w| unsafe { w.bits(registers.pinctrl) });
    }

    fn exec(&mut self, sm: u8, instruction: u16) {
        pio1()
            .sm(sm as usize)
            .sm_instr()
            .write(|w| unsafe { w.bits(instruction as u32) });
    }

    fn drain_fifos(&mut self, sm: u8) {
        let shiftctrl = pio1().sm(sm as usize).sm_shiftctrl();
        shiftctrl.modify(|r, w| unsafe { w.bits(r.bits() ^ SHIFTCTRL_FJOIN_RX) });
        shiftctrl.modify(|r, w| unsafe { w.bits(r.bits() ^ SHIFTCTRL_FJOIN_RX) });
    }

    fn claim_pin(&mut self, pin: u8) {
        // SAFETY: only pins named by the board description reach here, and
        // `board` has already given up their HAL handles.
        let (io, pads) = unsafe { (&*pac::IO_BANK0::ptr(), &*pac::PADS_BANK0::ptr()) };
        pads.gpio(pin as usize)
            .modify(|r, w| unsafe { w.bits((r.bits() | PAD_IE) & !(PAD_OD | PAD_ISO)) });
        io.gpio(pin as usize)
            .gpio_ctrl()
            .write(|w| unsafe { w.bits(FUNCSEL_PIO1) });
    }

    fn set_irq_routing(&mut self, line: u8, flag: u8, enabled: bool) {
        let bit = 1u32 << (INTE_SM_FLAG_SHIFT + flag as u32);
        let inte = pio1().sm_irq(line as usize).irq_inte();
        inte.modify(|r, w| unsafe {
            w.bits(if enabled { r.bits() | bit } else { r.bits() & !bit })
        });
    }

    fn rx_pop(&mut self, sm: u8) -> Option<u32> {
        let empty = pio1().fstat().read().bits() >> FSTAT_RXEMPTY_SHIFT & 1 << sm != 0;
        if empty {
            return None;
        }
        Some(pio1().rxf(sm as usize).read().bits())
    }

    fn tx_push(&mut self, sm: u8, word: u32) -> bool {
        let full = pio1().fstat().read().bits() >> FSTAT_TXFULL_SHIFT & 1 << sm != 0;
        if full {
            return false;
        }
        pio1().txf(sm as usize).write(|w| unsafe { w.bits(word) });
        true
    }

    fn irq_flags(&self) -> u8 {
        pio1().irq().read().bits() as u8
    }

    fn clear_irq(&mut self, mask: u8) {
        pio1().irq().write(|w| unsafe { w.bits(mask as u32) });
    }
}

/// Interrupt-context handle on the PIO1 request flags.
pub struct Rp2350PioIrq;

impl PioIrq for Rp2350PioIrq {
    fn flags(&self) -> u8 {
        pio1().irq().read().bits() as u8
    }

    fn clear(&self, mask: u8) {
        pio1().irq().write(|w| unsafe { w.bits(mask as u32) });
    }
}
