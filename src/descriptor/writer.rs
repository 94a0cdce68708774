//! Descriptor text from a device configuration

use alloc::format;
use alloc::string::String;
use core::fmt::Write;

use crate::config::{
    DEFAULT_START_LINE, DeviceConfig, EpdTiming, I2cInitStep, InterfaceConfig, InterfaceKind,
    LutTable, Pin, SideInit, TransferHints,
};

const BYTES_PER_LINE: usize = 16;

/// Render a configuration as descriptor text
///
/// Parsing the result yields a configuration equal to `config`, as long as
/// `config` itself came from [`parse`](super::parse) or follows the same
/// rules (opcodes of 0xFF stored as `None`, LUTs no longer than declared).
pub fn write(config: &DeviceConfig) -> String {
    let mut out = String::new();
    header(&mut out, config);

    if let Some(splash) = &config.splash {
        let _ = writeln!(
            out,
            ":S,{},{},{},{},{},{}",
            splash.font, splash.size, splash.foreground, splash.background, splash.x, splash.y
        );
    }

    init(&mut out, config);

    if let Some(side) = &config.side_init {
        match side {
            SideInit::Spi {
                clk,
                mosi,
                cs,
                reset,
                stream,
            } => {
                let _ = writeln!(
                    out,
                    ":IS,{},{},{},{}",
                    pin(*clk),
                    pin(*mosi),
                    pin(*cs),
                    pin(*reset)
                );
                hex_lines(&mut out, stream, BYTES_PER_LINE);
            }
            SideInit::I2c {
                bus,
                address,
                steps,
            } => {
                let _ = writeln!(out, ":II,{},{:02x}", bus, address);
                for step in steps {
                    let _ = match step {
                        I2cInitStep::Register(register, value) => {
                            writeln!(out, "{:02x},{:02x}", register, value)
                        }
                        I2cInitStep::Delay(ms) => writeln!(out, "{:02x}", ms),
                    };
                }
            }
        }
    }

    if !config.full_refresh_commands().is_empty() {
        out.push_str(":f\n");
        hex_lines(&mut out, config.full_refresh_commands(), BYTES_PER_LINE);
    }
    if !config.partial_refresh_commands().is_empty() {
        out.push_str(":p\n");
        hex_lines(&mut out, config.partial_refresh_commands(), BYTES_PER_LINE);
    }

    timings(&mut out, config);
    opcodes(&mut out, config);
    luts(&mut out, config);

    if config.epd_timing != EpdTiming::default() {
        let t = &config.epd_timing;
        let _ = writeln!(out, ":T,{},{},{}", t.full, t.partial, t.update);
    }
    if config.transfer != TransferHints::default() {
        let _ = writeln!(
            out,
            ":B,{},{}",
            config.transfer.flush_lines,
            config.transfer.flags()
        );
    }
    if let Some(map) = &config.rotation_map {
        let _ = writeln!(out, ":M,{},{},{},{}", map.x_min, map.x_max, map.y_min, map.y_max);
    }
    if config.bit_packing != 0 {
        let _ = writeln!(out, ":b,{}", config.bit_packing);
    }

    out.push_str("#\n");
    out
}

fn pin(pin: Pin) -> i32 {
    pin.map_or(-1, i32::from)
}

fn opcode(value: Option<u8>) -> u8 {
    value.unwrap_or(0xFF)
}

fn pins(out: &mut String, pins: &[Pin]) {
    for &p in pins {
        let _ = write!(out, ",{}", pin(p));
    }
}

fn hex_lines(out: &mut String, bytes: &[u8], per_line: usize) {
    for line in bytes.chunks(per_line) {
        for (index, byte) in line.iter().enumerate() {
            let separator = if index == 0 { "" } else { "," };
            let _ = write!(out, "{separator}{byte:02x}");
        }
        out.push('\n');
    }
}

fn header(out: &mut String, config: &DeviceConfig) {
    let _ = write!(
        out,
        ":H,{},{},{},{}",
        config.name, config.width, config.height, config.depth
    );
    match &config.interface {
        Some(InterfaceConfig::I2c(w)) => {
            let keyword = if w.bus == 1 { "I2C2" } else { "I2C" };
            let _ = write!(out, ",{},{:02x}", keyword, w.address);
            pins(out, &[w.scl, w.sda, w.reset]);
        }
        Some(InterfaceConfig::Spi(w)) => {
            let _ = write!(out, ",SPI,{}", w.bus);
            pins(out, &[w.cs, w.clk, w.mosi, w.dc, w.backlight, w.reset, w.miso]);
            let _ = write!(out, ",{}", w.speed);
        }
        Some(InterfaceConfig::Parallel(w)) => {
            let _ = write!(out, ",PAR,{}", w.width);
            pins(out, &[w.reset, w.cs, w.rs, w.wr, w.rd, w.backlight]);
            pins(out, &w.data[..usize::from(w.width).min(w.data.len())]);
            let _ = write!(out, ",{}", w.speed);
        }
        Some(InterfaceConfig::Rgb(w)) => {
            out.push_str(",RGB");
            pins(out, &[w.de, w.vsync, w.hsync, w.pclk, w.backlight]);
            pins(out, &w.data);
            let _ = write!(out, ",{}", w.speed);
        }
        Some(InterfaceConfig::Dsi(w)) => {
            let _ = write!(out, ",DSI,{}", w.lanes);
            pins(out, &[w.te, w.backlight, w.reset]);
            let _ = write!(
                out,
                ",{},{},{},{},{},{}",
                w.ldo_channel, w.ldo_millivolts, w.pixel_clock, w.lane_speed, w.rgb_order, w.endian
            );
        }
        None => {}
    }
    out.push('\n');
}

fn init(out: &mut String, config: &DeviceConfig) {
    let bytes = config.init_commands();
    if config.all_commands {
        out.push_str(":IC\n");
    } else if !bytes.is_empty() {
        out.push_str(":I\n");
    }
    let per_line = if config.interface_kind() == Some(InterfaceKind::I2c) {
        1
    } else {
        BYTES_PER_LINE
    };
    hex_lines(out, bytes, per_line);
}

fn timings(out: &mut String, config: &DeviceConfig) {
    if let Some(t) = &config.rgb_timing {
        let _ = writeln!(
            out,
            ":V,{},{},{},{},{},{},{},{},{}",
            u8::from(!t.hsync_idle_low),
            t.hsync_front_porch,
            t.hsync_pulse_width,
            t.hsync_back_porch,
            u8::from(!t.vsync_idle_low),
            t.vsync_front_porch,
            t.vsync_pulse_width,
            t.vsync_back_porch,
            u8::from(t.pclk_active_neg)
        );
    }
    if let Some(t) = &config.dsi_timing {
        let _ = writeln!(
            out,
            ":V,{},{},{},{},{},{}",
            t.h_front_porch, t.v_front_porch, t.h_back_porch, t.h_sync_width, t.v_sync_width, t.v_back_porch
        );
    }
}

fn opcodes(out: &mut String, config: &DeviceConfig) {
    if let Some(off) = config.display_off {
        let _ = writeln!(out, ":o,{:02x}", off);
    }
    if let Some(on) = config.display_on {
        let _ = writeln!(out, ":O,{:02x}", on);
    }
    if config.memory_access.is_some() || config.start_line != DEFAULT_START_LINE {
        let _ = writeln!(
            out,
            ":R,{:02x},{:02x}",
            opcode(config.memory_access),
            config.start_line
        );
    }

    let rgb = config.interface_kind() == Some(InterfaceKind::Rgb);
    for (index, entry) in config.rotations.iter().enumerate() {
        if rgb {
            let _ = writeln!(out, ":{},{}", index, entry.transform);
        } else {
            let _ = writeln!(
                out,
                ":{},{:02x},{:02x},{:02x},{}",
                index, entry.value, entry.x_offset, entry.y_offset, entry.transform
            );
        }
    }

    let a = &config.address;
    let paged = config.interface_kind() == Some(InterfaceKind::I2c) || config.bpp() == 1;
    if paged {
        let p = &config.pages;
        let _ = writeln!(
            out,
            ":A,{:02x},{:02x},{:02x},{:02x},{:02x},{:02x},{:02x}",
            a.set_x,
            p.page_start,
            p.page_end,
            a.set_y,
            p.col_start,
            p.col_end,
            opcode(a.write_ram)
        );
    } else {
        let _ = writeln!(
            out,
            ":A,{:02x},{:02x},{:02x},{}",
            a.set_x,
            a.set_y,
            opcode(a.write_ram),
            a.mode.bits()
        );
    }

    if config.color_mode != 16 {
        let _ = writeln!(out, ":P,{}", config.color_mode);
    }
    if config.invert_off.is_some() || config.invert_on.is_some() {
        let _ = writeln!(
            out,
            ":i,{:02x},{:02x}",
            opcode(config.invert_off),
            opcode(config.invert_on)
        );
    }
    if let Some(dim) = config.dim_opcode {
        let _ = writeln!(out, ":D,{:02x}", dim);
    }
}

fn lut(out: &mut String, header: &str, table: &LutTable) {
    let _ = writeln!(out, ":{},{},{:02x}", header, table.declared, table.command);
    hex_lines(out, &table.data, BYTES_PER_LINE);
}

fn luts(out: &mut String, config: &DeviceConfig) {
    if let Some(table) = &config.luts.full {
        lut(out, "L", table);
    }
    if let Some(table) = &config.luts.partial {
        lut(out, "l", table);
    }
    for (index, table) in config.luts.indexed.iter().enumerate() {
        if let Some(table) = table {
            lut(out, &format!("L{}", index + 1), table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::parse;

    #[test]
    fn test_header_and_terminator() {
        let config = parse(":H,NAME,128,64,1,I2C,3c,5,4,-1\n").config;
        let text = write(&config);
        assert!(text.starts_with(":H,NAME,128,64,1,I2C,3c,5,4,-1\n"));
        assert!(text.ends_with("#\n"));
    }

    #[test]
    fn test_i2c_init_one_byte_per_line() {
        let config = parse(":H,X,128,64,1,I2C,3c,-1,-1,-1\n:I\nAE\nD5,80\n").config;
        let text = write(&config);
        assert!(text.contains(":I\nae\nd5\n80\n"));
    }

    #[test]
    fn test_all_commands_header() {
        let config = parse(":H,X,320,240,16,SPI,1,5,18,23,16,-1,-1,-1,40\n:IC\n01,80\n").config;
        assert!(config.all_commands);
        assert!(write(&config).contains(":IC\n01,80\n"));
    }

    #[test]
    fn test_disabled_opcodes_write_ff() {
        let config = parse(":H,X,320,240,16,SPI,1,5,18,23,16,-1,-1,-1,40\n:i,ff,21\n").config;
        assert_eq!(config.invert_off, None);
        assert!(write(&config).contains(":i,ff,21\n"));
    }
}
