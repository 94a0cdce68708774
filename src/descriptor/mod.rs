//! Device descriptor parsing and writing
//!
//! A descriptor is a small line-oriented text format that describes one
//! display model. Lines are grouped into sections opened by `:X`; a section
//! stays active until the next header. Values are comma-separated decimal
//! integers, hex bytes (with or without `0x`) or short names.
//!
//! - A line starting with `;` is a comment
//! - A line starting with `#` ends the descriptor
//! - A space splits a line into several logical lines
//!
//! Malformed lines never abort parsing. They are skipped, logged, and
//! reported in [`Parsed::issues`] so callers can decide whether a partially
//! configured device is acceptable.
//!
//! ## Example
//!
//! ```
//! use panelkit::descriptor;
//! use panelkit::config::InterfaceConfig;
//!
//! let parsed = descriptor::parse(
//!     ":H,SSD1306,128,64,1,I2C,3c,5,4,-1\n\
//!      :S,0,2,1,0,30,20\n\
//!      :I\n\
//!      AE\n\
//!      D5,80\n\
//!      AF\n\
//!      :o,AE\n\
//!      :O,AF\n\
//!      :A,00,00,07,10,00,7f,ff\n\
//!      #\n",
//! );
//! assert!(parsed.is_clean());
//!
//! let config = parsed.config;
//! assert_eq!((config.width, config.height, config.bpp()), (128, 64, 1));
//! assert!(matches!(&config.interface, Some(InterfaceConfig::I2c(w)) if w.address == 0x3C));
//! assert_eq!(config.init_commands(), &[0xAE, 0xD5, 0x80, 0xAF]);
//! assert_eq!(config.display_on, Some(0xAF));
//! assert!(config.epd_mode.is_none());
//!
//! // Writing the configuration back out gives an equivalent descriptor
//! let text = descriptor::write(&config);
//! assert_eq!(descriptor::parse(&text).config, config);
//! ```

mod cursor;
mod parser;
mod writer;

pub use cursor::{Cursor, parse_hex, parse_int};
pub use parser::{IssueKind, MAX_NAME_LEN, ParseIssue, Parsed};
pub use writer::write;

/// Parse a descriptor into a device configuration
///
/// Never fails; see [`Parsed::issues`] for lines that were not applied.
pub fn parse(text: &str) -> Parsed {
    parser::Parser::new().run(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AddressMode, EpdMode, I2cInitStep, I2cWiring, InterfaceConfig, InterfaceKind, LutTable,
        SideInit,
    };

    const ST7789: &str = "\
:H,ST7789,240,320,16,SPI,1,5,18,23,16,4,17,-1,40
:S,2,1,1,0,40,20
:I
01,A0
11,A0
3A,81,55
36,81,00
21,80
29,A0
:o,28
:O,29
:A,2A,2B,2C,16
:R,36
:0,00,00,00,0
:1,60,00,00,1
:2,C0,00,00,2
:3,A0,00,00,3
:i,20,21
:B,60,1
#
";

    #[test]
    fn test_i2c_header_line() {
        let parsed = parse(":H,NAME,128,64,1,I2C,3c,5,4,-1");
        let config = parsed.config;
        assert_eq!(config.name, "NAME");
        assert_eq!(config.width, 128);
        assert_eq!(config.height, 64);
        assert_eq!(config.bpp(), 1);
        assert_eq!(config.color_type(), crate::config::ColorType::Mono);
        assert_eq!(
            config.interface,
            Some(InterfaceConfig::I2c(I2cWiring {
                bus: 0,
                address: 0x3C,
                scl: Some(5),
                sda: Some(4),
                reset: None,
            }))
        );
    }

    #[test]
    fn test_i2c2_selects_second_bus() {
        let config = parse(":H,OLED,128,32,1,I2C2,3d,22,21,-1").config;
        assert!(matches!(
            config.interface,
            Some(InterfaceConfig::I2c(I2cWiring { bus: 1, address: 0x3D, .. }))
        ));
    }

    #[test]
    fn test_spi_descriptor() {
        let parsed = parse(ST7789);
        assert!(parsed.is_clean(), "{:?}", parsed.issues);
        let config = parsed.config;
        assert_eq!(config.interface_kind(), Some(InterfaceKind::Spi));
        assert_eq!(config.bpp(), 16);
        assert_eq!(config.address.set_x, 0x2A);
        assert_eq!(config.address.set_y, 0x2B);
        assert_eq!(config.address.write_ram, Some(0x2C));
        assert_eq!(config.address.mode, AddressMode::Word);
        assert_eq!(config.memory_access, Some(0x36));
        assert_eq!(config.rotations[1].value, 0x60);
        assert_eq!(config.invert_on, Some(0x21));
        assert_eq!(config.transfer.flush_lines, 60);
        assert!(config.transfer.use_dma);
        assert_eq!(config.init_commands().len(), 14);
        assert_eq!(config.splash.as_ref().map(|s| s.background_color(16)), Some(0x0000));
    }

    #[test]
    fn test_space_continues_line() {
        let config = parse(":H,X,240,320,16,SPI,1,5,18,23,16,4,17,-1,40 :I 11,80 29,80").config;
        assert_eq!(config.init_commands(), &[0x11, 0x80, 0x29, 0x80]);
    }

    #[test]
    fn test_comment_and_terminator() {
        let parsed = parse(
            "; leading comment\n:H,X,128,64,1,I2C,3c,-1,-1,-1\n:I\nAE\n#\n:I\nAF\n",
        );
        assert!(parsed.is_clean());
        assert_eq!(parsed.config.init_commands(), &[0xAE]);
    }

    #[test]
    fn test_i2c_init_takes_two_bytes_per_line() {
        let config = parse(":H,X,128,64,1,I2C,3c,-1,-1,-1\n:I\nA8,3F,99\nAF\n").config;
        assert_eq!(config.init_commands(), &[0xA8, 0x3F, 0xAF]);
    }

    #[test]
    fn test_paged_address_form() {
        let config = parse(":H,X,128,64,1,I2C,3c,-1,-1,-1\n:A,21,00,07,02,00,7f,ff\n").config;
        assert_eq!(config.address.set_x, 0x21);
        assert_eq!(config.address.set_y, 0x02);
        assert_eq!(config.pages.page_end, 0x07);
        assert_eq!(config.pages.col_end, 0x7F);
        assert_eq!(config.address.write_ram, None);
    }

    #[test]
    fn test_byte_address_mode() {
        let config = parse(":H,X,128,128,16,SPI,1,5,18,23,16,4,17,-1,40\n:A,15,75,5C,8\n").config;
        assert_eq!(config.address.mode, AddressMode::Byte);
    }

    #[test]
    fn test_two_table_epaper() {
        let parsed = parse(
            ":H,EPD29,128,296,1,SPI,1,5,18,23,17,-1,16,4,10\n\
             :I\n01,03,27,01,00\n\
             :L,4,32\n02,02,01,11\n\
             :l,4,32\n10,18,18,08\n\
             :T,350,35,10\n",
        );
        assert!(parsed.is_clean(), "{:?}", parsed.issues);
        let config = parsed.config;
        assert_eq!(config.epd_mode, Some(EpdMode::TwoTable));
        assert_eq!(config.luts.full.as_ref().map(|l| l.data.len()), Some(4));
        assert_eq!(config.interface.as_ref().and_then(|i| i.busy_pin()), Some(4));
    }

    #[test]
    fn test_five_table_epaper() {
        let config = parse(
            ":H,EPD42,400,300,1,SPI,1,5,18,23,17,-1,16,4,10\n\
             :L1,3,20\n01,02,03\n\
             :L2,2,21\n04,05\n\
             :L3,2,22\n06,07\n\
             :L4,2,23\n08,09\n\
             :L5,2,24\n0a,0b\n",
        )
        .config;
        assert_eq!(config.epd_mode, Some(EpdMode::FiveTable));
        assert_eq!(config.luts.indexed[4].as_ref().map(|l| l.command), Some(0x24));
    }

    #[test]
    fn test_command_sequence_epaper() {
        let config = parse(
            ":H,EPD213,122,250,1,SPI,1,5,18,23,17,-1,16,4,10\n\
             :I\n12,00\n\
             :f\n22,01,F7,20,00\n\
             :p\n22,01,FF,20,00\n",
        )
        .config;
        assert_eq!(config.epd_mode, Some(EpdMode::CommandSequence));
        assert_eq!(config.init_commands(), &[0x12, 0x00]);
        assert_eq!(config.full_refresh_commands(), &[0x22, 0x01, 0xF7, 0x20, 0x00]);
        assert_eq!(config.partial_refresh_commands(), &[0x22, 0x01, 0xFF, 0x20, 0x00]);
        assert_eq!(config.commands.len(), 12);
    }

    #[test]
    fn test_rgb_side_init() {
        let config = parse(
            ":H,ST7701,480,480,16,RGB,17,3,46,9,38,10,11,12,13,14,21,8,18,45,38,39,40,41,42,2,1,14000000\n\
             :IS,48,47,39,-1\n\
             FF,05,77,01,00,00,10\n\
             :V,1,10,8,50,1,10,8,20,0\n",
        )
        .config;
        assert_eq!(
            config.side_init,
            Some(SideInit::Spi {
                clk: Some(48),
                mosi: Some(47),
                cs: Some(39),
                reset: None,
                stream: alloc::vec![0xFF, 0x05, 0x77, 0x01, 0x00, 0x00, 0x10],
            })
        );
        let timing = config.rgb_timing.as_ref().map(|t| (t.hsync_idle_low, t.vsync_back_porch));
        assert_eq!(timing, Some((false, 20)));
    }

    #[test]
    fn test_rgb_i2c_side_init() {
        let config = parse(
            ":H,RGB4,480,480,16,RGB,17,3,46,9,38,10,11,12,13,14,21,8,18,45,38,39,40,41,42,2,1,14000000\n\
             :II,0,5d\n\
             36,08\n\
             78\n",
        )
        .config;
        assert_eq!(
            config.side_init,
            Some(SideInit::I2c {
                bus: 0,
                address: 0x5D,
                steps: alloc::vec![I2cInitStep::Register(0x36, 0x08), I2cInitStep::Delay(0x78)],
            })
        );
    }

    #[test]
    fn test_malformed_line_is_flagged_not_fixed() {
        let parsed = parse(
            ":H,X,240,320,16,SPI,1,5,18,23,16,4,17,-1,40\n\
             :A,2A,zz,2C,16\n\
             :Q,1,2\n",
        );
        // The device is only partly configured and the caller is told so
        assert_eq!(parsed.config.address.set_x, 0x2A);
        assert_eq!(parsed.config.address.set_y, 0);
        assert_eq!(parsed.config.address.write_ram, Some(0x2C));
        assert_eq!(
            parsed.issues,
            [
                ParseIssue {
                    line: 2,
                    kind: IssueKind::MalformedValue("set y"),
                },
                ParseIssue {
                    line: 3,
                    kind: IssueKind::UnknownSection('Q'),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_interface_leaves_no_interface() {
        let parsed = parse(":H,X,240,320,16,CAN,1,2,3\n");
        assert!(parsed.config.interface.is_none());
        assert!(matches!(
            parsed.issues.first().map(|i| &i.kind),
            Some(IssueKind::UnknownInterface(name)) if name == "CAN"
        ));
    }

    #[test]
    fn test_lut_overflow_and_incomplete() {
        let parsed = parse(
            ":H,E,8,8,1,SPI,1,5,18,23,17,-1,16,4,10\n\
             :L,2,32\n01,02,03\n\
             :l,4,32\n01\n",
        );
        assert!(parsed
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::LutOverflow { dropped: 1 }));
        assert!(parsed.issues.iter().any(|i| i.line == 4
            && i.kind
                == IssueKind::IncompleteLut {
                    declared: 4,
                    filled: 1,
                }));
        // Both tables hold bytes, so the two-table protocol is selected
        assert_eq!(parsed.config.epd_mode, Some(EpdMode::TwoTable));
    }

    #[test]
    fn test_oversized_lut_is_dropped() {
        let parsed = parse(
            ":H,E,8,8,1,SPI,1,5,18,23,17,-1,16,4,10\n\
             :L1,2147483647,32\n01,02\n\
             :L2,2,32\n01,02\n",
        );
        assert!(parsed.issues.iter().any(|i| i.line == 2
            && i.kind
                == IssueKind::LutTooLarge {
                    declared: 2_147_483_647,
                }));
        let luts = &parsed.config.luts;
        assert!(luts.indexed[0].is_none());
        assert!(luts.indexed[1].as_ref().is_some_and(LutTable::is_complete));
    }

    #[test]
    fn test_writer_round_trip() {
        for text in [
            ST7789,
            ":H,SSD1306,128,64,1,I2C,3c,5,4,-1\n:I\nAE\nD5,80\n:A,00,00,07,10,00,7f,ff\n:D,81\n",
            ":H,EPD213,122,250,1,SPI,1,5,18,23,17,-1,16,4,10\n:f\n22,01,F7\n:p\n22,01,FF\n:T,300,30,5\n",
            ":H,EPD29,128,296,1,SPI,1,5,18,23,17,-1,16,4,10\n:L,2,32\n02,02\n:l,2,33\n10\n:M,0,4095,0,4095\n",
            ":H,ILI9488,480,320,18,PAR,16,4,5,6,7,-1,45,1,2,3,8,9,10,11,12,13,14,15,16,17,18,19,20,20\n:P,18\n:IC\n3A,01,66\n",
            ":H,DSI7,1024,600,16,DSI,2,-1,23,27,3,2500,52000000,750,0,0\n:I\nB0,01,00,00\n:V,160,12,160,10,1,23\n",
        ] {
            let config = parse(text).config;
            let written = write(&config);
            assert_eq!(parse(&written).config, config, "{written}");
        }
    }
}
