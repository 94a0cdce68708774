//! Section-by-section descriptor parser

use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, trace, warn};

use super::cursor::Cursor;
use crate::config::{
    AddressMode, CommandTable, DeviceConfig, DsiTiming, DsiWiring, I2cInitStep, I2cWiring,
    InterfaceConfig, InterfaceKind, LutTable, ParallelWiring, Pin, RgbTiming, RgbWiring,
    RotationMap, SideInit, Splash, SpiWiring,
};

/// Longest model name kept from a header line
pub const MAX_NAME_LEN: usize = 31;

/// A descriptor line that was skipped or only partly applied
#[derive(Clone, Debug, PartialEq)]
pub struct ParseIssue {
    /// 1-based line number
    pub line: usize,
    /// What went wrong
    pub kind: IssueKind,
}

/// Reason a line was skipped or degraded
#[derive(Clone, Debug, PartialEq)]
pub enum IssueKind {
    /// `:X` named a section this parser does not know
    UnknownSection(char),
    /// The section is known but not supported
    UnsupportedSection(char),
    /// Data appeared before any section header
    NoSection,
    /// The header named an interface this parser does not know
    UnknownInterface(String),
    /// A required header field was absent
    MissingField(&'static str),
    /// A token could not be read as a number
    MalformedValue(&'static str),
    /// The line does not apply to the interface in use
    NotForInterface(char),
    /// More LUT bytes were supplied than declared
    LutOverflow {
        /// Bytes dropped
        dropped: usize,
    },
    /// A LUT header declared more bytes than can be held
    LutTooLarge {
        /// Declared size
        declared: usize,
    },
    /// A LUT ended with fewer bytes than declared
    IncompleteLut {
        /// Declared size
        declared: usize,
        /// Bytes supplied
        filled: usize,
    },
}

/// Result of parsing a descriptor
#[derive(Clone, Debug, PartialEq)]
pub struct Parsed {
    /// The device configuration, possibly partial
    pub config: DeviceConfig,
    /// Lines that were skipped or degraded, in order
    pub issues: Vec<ParseIssue>,
}

impl Parsed {
    /// Whether every line was applied
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LutTarget {
    Full,
    Partial,
    Indexed(usize),
}

pub(super) struct Parser {
    config: DeviceConfig,
    issues: Vec<ParseIssue>,
    section: Option<u8>,
    line: usize,
    init: Vec<u8>,
    full: Vec<u8>,
    partial: Vec<u8>,
    lut: Option<LutTarget>,
    lut_lines: Vec<(LutTarget, usize)>,
}

impl Parser {
    pub(super) fn new() -> Self {
        Self {
            config: DeviceConfig::default(),
            issues: Vec::new(),
            section: None,
            line: 0,
            init: Vec::new(),
            full: Vec::new(),
            partial: Vec::new(),
            lut: None,
            lut_lines: Vec::new(),
        }
    }

    pub(super) fn run(mut self, text: &str) -> Parsed {
        for (index, raw) in text.lines().enumerate() {
            self.line = index + 1;
            let line = raw.trim_start_matches(' ');
            if line.starts_with('#') {
                break;
            }
            if line.starts_with(';') {
                continue;
            }
            // A space continues with a new logical line
            for segment in line.split(' ').filter(|s| !s.is_empty()) {
                if segment.starts_with(';') {
                    break;
                }
                self.segment(segment);
            }
        }
        self.finish()
    }

    fn issue(&mut self, kind: IssueKind) {
        warn!("descriptor line {}: {:?}", self.line, kind);
        self.issues.push(ParseIssue {
            line: self.line,
            kind,
        });
    }

    fn segment(&mut self, text: &str) {
        let mut cursor = Cursor::new(text);
        if cursor.skip_if(b':') {
            let Some(section) = cursor.peek() else {
                return;
            };
            cursor.advance(1);
            self.section = Some(section);
            self.section_header(section, &mut cursor);
            cursor.skip_if(b',');
        }
        if cursor.at_end() {
            return;
        }
        match self.section {
            Some(section) => self.section_data(section, &mut cursor),
            None => self.issue(IssueKind::NoSection),
        }
    }

    fn section_header(&mut self, section: u8, cursor: &mut Cursor<'_>) {
        match section {
            b'I' => {
                if cursor.skip_if(b'C') {
                    self.config.all_commands = true;
                }
                if cursor.skip_if(b'S') {
                    cursor.skip_if(b',');
                    self.side_spi_header(cursor);
                } else if cursor.skip_if(b'I') {
                    cursor.skip_if(b',');
                    self.side_i2c_header(cursor);
                }
            }
            b'L' => {
                let index = cursor
                    .peek()
                    .filter(|digit| (b'1'..=b'5').contains(digit))
                    .map(|digit| (digit - b'1') as usize);
                if index.is_some() {
                    cursor.advance(1);
                }
                cursor.skip_if(b',');
                let target = index.map_or(LutTarget::Full, LutTarget::Indexed);
                self.lut_header(target, cursor);
            }
            b'l' => {
                cursor.skip_if(b',');
                self.lut_header(LutTarget::Partial, cursor);
            }
            _ => {}
        }
    }

    fn section_data(&mut self, section: u8, cursor: &mut Cursor<'_>) {
        trace!("section {}: {}", section as char, cursor.rest());
        match section {
            b'H' => {
                self.header(cursor);
                self.section = None;
            }
            b'S' => self.splash(cursor),
            b'I' => self.init(cursor),
            b'f' => {
                let mut bytes = core::mem::take(&mut self.full);
                self.hex_list(cursor, &mut bytes);
                self.full = bytes;
            }
            b'p' => {
                let mut bytes = core::mem::take(&mut self.partial);
                self.hex_list(cursor, &mut bytes);
                self.partial = bytes;
            }
            b'V' => self.timing(cursor),
            b'o' => self.config.display_off = self.opcode(cursor, "display off"),
            b'O' => self.config.display_on = self.opcode(cursor, "display on"),
            b'R' => {
                self.config.memory_access = self.opcode(cursor, "memory access");
                if let Some(value) = self.hex(cursor, "start line") {
                    self.config.start_line = value as u8;
                }
            }
            b'0'..=b'3' => self.rotation(usize::from(section - b'0'), cursor),
            b'A' => self.address(cursor),
            b'a' => {
                self.read_hex_u8(cursor, "set x", |c, v| c.address.set_x = v);
                self.read_hex_u8(cursor, "set y", |c, v| c.address.set_y = v);
                self.config.address.write_ram = self.opcode(cursor, "write ram");
            }
            b'P' => {
                if let Some(mode) = self.int(cursor, "color mode") {
                    self.config.color_mode = mode.clamp(0, 255) as u8;
                }
            }
            b'i' => {
                self.config.invert_off = self.opcode(cursor, "invert off");
                self.config.invert_on = self.opcode(cursor, "invert on");
            }
            b'D' => self.config.dim_opcode = self.opcode(cursor, "dim"),
            b'L' | b'l' => self.lut_data(cursor),
            b'T' => {
                if let Some(time) = self.int(cursor, "full time") {
                    self.config.epd_timing.full = clamp_u16(time);
                }
                if let Some(time) = self.int(cursor, "partial time") {
                    self.config.epd_timing.partial = clamp_u16(time);
                }
                if let Some(time) = self.int(cursor, "update time") {
                    self.config.epd_timing.update = clamp_u16(time);
                }
            }
            b'B' => {
                if let Some(lines) = self.int(cursor, "flush lines") {
                    self.config.transfer.flush_lines = clamp_u16(lines);
                }
                if let Some(flags) = self.int(cursor, "flags") {
                    self.config.transfer.set_flags(flags as u8);
                }
            }
            b'M' => {
                let mut map = RotationMap::default();
                map.x_min = self.int(cursor, "x min").unwrap_or(0);
                map.x_max = self.int(cursor, "x max").unwrap_or(0);
                map.y_min = self.int(cursor, "y min").unwrap_or(0);
                map.y_max = self.int(cursor, "y max").unwrap_or(0);
                self.config.rotation_map = Some(map);
            }
            b'b' => {
                if let Some(mode) = self.int(cursor, "bit packing") {
                    self.config.bit_packing = mode as u8;
                }
            }
            b'U' => self.issue(IssueKind::UnsupportedSection('U')),
            other => self.issue(IssueKind::UnknownSection(other as char)),
        }
    }

    fn int(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> Option<i32> {
        match cursor.next_int()? {
            Some(value) => Some(value),
            None => {
                self.issue(IssueKind::MalformedValue(field));
                None
            }
        }
    }

    fn required(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> Option<i32> {
        match cursor.next_int() {
            Some(Some(value)) => Some(value),
            Some(None) => {
                self.issue(IssueKind::MalformedValue(field));
                None
            }
            None => {
                self.issue(IssueKind::MissingField(field));
                None
            }
        }
    }

    fn hex(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> Option<u32> {
        match cursor.next_hex()? {
            Some(value) => Some(value),
            None => {
                self.issue(IssueKind::MalformedValue(field));
                None
            }
        }
    }

    fn read_hex_u8(
        &mut self,
        cursor: &mut Cursor<'_>,
        field: &'static str,
        apply: impl FnOnce(&mut DeviceConfig, u8),
    ) {
        if let Some(value) = self.hex(cursor, field) {
            apply(&mut self.config, value as u8);
        }
    }

    /// Opcode field where 0xFF means "not supported"
    fn opcode(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> Option<u8> {
        self.hex(cursor, field)
            .map(|value| value as u8)
            .filter(|&value| value != 0xFF)
    }

    fn pin(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> Pin {
        self.int(cursor, field)
            .and_then(|value| u8::try_from(value).ok())
    }

    fn unsigned(&mut self, cursor: &mut Cursor<'_>, field: &'static str) -> u32 {
        self.int(cursor, field)
            .map_or(0, |value| u32::try_from(value).unwrap_or(0))
    }

    fn hex_list(&mut self, cursor: &mut Cursor<'_>, out: &mut Vec<u8>) {
        while let Some(value) = cursor.next_hex() {
            match value {
                Some(byte) => out.push(byte as u8),
                None => {
                    self.issue(IssueKind::MalformedValue("command byte"));
                    break;
                }
            }
        }
    }

    fn header(&mut self, cursor: &mut Cursor<'_>) {
        let Some(name) = cursor.next_token() else {
            self.issue(IssueKind::MissingField("name"));
            return;
        };
        self.config.name = name.chars().take(MAX_NAME_LEN).collect();

        let Some(width) = self.required(cursor, "width") else {
            return;
        };
        let Some(height) = self.required(cursor, "height") else {
            return;
        };
        let Some(depth) = self.required(cursor, "depth") else {
            return;
        };
        self.config.width = clamp_u16(width);
        self.config.height = clamp_u16(height);
        self.config.depth = depth.clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        let Some(keyword) = cursor.next_token() else {
            self.issue(IssueKind::MissingField("interface"));
            return;
        };
        let interface = if keyword.starts_with("I2C") {
            InterfaceConfig::I2c(self.i2c_wiring(keyword, cursor))
        } else if keyword.starts_with("SPI") {
            InterfaceConfig::Spi(self.spi_wiring(cursor))
        } else if keyword.starts_with("PAR") {
            InterfaceConfig::Parallel(self.parallel_wiring(cursor))
        } else if keyword.starts_with("RGB") {
            InterfaceConfig::Rgb(self.rgb_wiring(cursor))
        } else if keyword.starts_with("DSI") {
            InterfaceConfig::Dsi(self.dsi_wiring(cursor))
        } else {
            self.issue(IssueKind::UnknownInterface(keyword.into()));
            return;
        };
        debug!(
            "descriptor {}: {}x{}x{} on {:?}",
            self.config.name,
            self.config.width,
            self.config.height,
            self.config.depth,
            interface.kind()
        );
        self.config.interface = Some(interface);
    }

    fn i2c_wiring(&mut self, keyword: &str, cursor: &mut Cursor<'_>) -> I2cWiring {
        I2cWiring {
            bus: u8::from(keyword.starts_with("I2C2")),
            address: self.hex(cursor, "i2c address").unwrap_or(0) as u8,
            scl: self.pin(cursor, "scl"),
            sda: self.pin(cursor, "sda"),
            reset: self.pin(cursor, "reset"),
        }
    }

    fn spi_wiring(&mut self, cursor: &mut Cursor<'_>) -> SpiWiring {
        SpiWiring {
            bus: self.int(cursor, "spi bus").unwrap_or(0) as u8,
            cs: self.pin(cursor, "cs"),
            clk: self.pin(cursor, "clk"),
            mosi: self.pin(cursor, "mosi"),
            dc: self.pin(cursor, "dc"),
            backlight: self.pin(cursor, "backlight"),
            reset: self.pin(cursor, "reset"),
            miso: self.pin(cursor, "miso"),
            speed: self.unsigned(cursor, "speed"),
        }
    }

    fn parallel_wiring(&mut self, cursor: &mut Cursor<'_>) -> ParallelWiring {
        let width = if self.int(cursor, "bus width") == Some(8) { 8 } else { 16 };
        let mut wiring = ParallelWiring {
            width,
            reset: self.pin(cursor, "reset"),
            cs: self.pin(cursor, "cs"),
            rs: self.pin(cursor, "rs"),
            wr: self.pin(cursor, "wr"),
            rd: self.pin(cursor, "rd"),
            backlight: self.pin(cursor, "backlight"),
            ..ParallelWiring::default()
        };
        for slot in wiring.data.iter_mut().take(width as usize) {
            *slot = self.pin(cursor, "data pin");
        }
        wiring.speed = self.unsigned(cursor, "speed");
        wiring
    }

    fn rgb_wiring(&mut self, cursor: &mut Cursor<'_>) -> RgbWiring {
        let mut wiring = RgbWiring {
            de: self.pin(cursor, "de"),
            vsync: self.pin(cursor, "vsync"),
            hsync: self.pin(cursor, "hsync"),
            pclk: self.pin(cursor, "pclk"),
            backlight: self.pin(cursor, "backlight"),
            ..RgbWiring::default()
        };
        for slot in &mut wiring.data {
            *slot = self.pin(cursor, "data pin");
        }
        wiring.speed = self.unsigned(cursor, "speed");
        wiring
    }

    fn dsi_wiring(&mut self, cursor: &mut Cursor<'_>) -> DsiWiring {
        DsiWiring {
            lanes: self.int(cursor, "lanes").unwrap_or(0) as u8,
            te: self.pin(cursor, "te"),
            backlight: self.pin(cursor, "backlight"),
            reset: self.pin(cursor, "reset"),
            ldo_channel: self.int(cursor, "ldo channel").unwrap_or(-1),
            ldo_millivolts: self.unsigned(cursor, "ldo voltage"),
            pixel_clock: self.unsigned(cursor, "pixel clock"),
            lane_speed: self.unsigned(cursor, "lane speed"),
            rgb_order: self.int(cursor, "rgb order").unwrap_or(0) as u8,
            endian: self.int(cursor, "endian").unwrap_or(0) as u8,
        }
    }

    fn is_rgb(&self) -> bool {
        self.config.interface_kind() == Some(InterfaceKind::Rgb)
    }

    fn side_spi_header(&mut self, cursor: &mut Cursor<'_>) {
        if !self.is_rgb() {
            self.issue(IssueKind::NotForInterface('S'));
            cursor.advance(usize::MAX);
            return;
        }
        let clk = self.pin(cursor, "side clk");
        let mosi = self.pin(cursor, "side mosi");
        let cs = self.pin(cursor, "side cs");
        let reset = self.pin(cursor, "side reset");
        self.config.side_init = Some(SideInit::Spi {
            clk,
            mosi,
            cs,
            reset,
            stream: Vec::new(),
        });
    }

    fn side_i2c_header(&mut self, cursor: &mut Cursor<'_>) {
        if !self.is_rgb() {
            self.issue(IssueKind::NotForInterface('I'));
            cursor.advance(usize::MAX);
            return;
        }
        let bus = self.int(cursor, "side bus").unwrap_or(0) as u8;
        let address = self.hex(cursor, "side address").unwrap_or(0) as u8;
        self.config.side_init = Some(SideInit::I2c {
            bus,
            address,
            steps: Vec::new(),
        });
    }

    fn init(&mut self, cursor: &mut Cursor<'_>) {
        match self.config.side_init.take() {
            Some(SideInit::Spi {
                clk,
                mosi,
                cs,
                reset,
                mut stream,
            }) => {
                self.hex_list(cursor, &mut stream);
                self.config.side_init = Some(SideInit::Spi {
                    clk,
                    mosi,
                    cs,
                    reset,
                    stream,
                });
            }
            Some(SideInit::I2c {
                bus,
                address,
                mut steps,
            }) => {
                let mut bytes = Vec::new();
                self.hex_list(cursor, &mut bytes);
                match bytes.as_slice() {
                    [register, value] => steps.push(I2cInitStep::Register(*register, *value)),
                    [ms] => steps.push(I2cInitStep::Delay(*ms)),
                    _ => self.issue(IssueKind::MalformedValue("side init line")),
                }
                self.config.side_init = Some(SideInit::I2c {
                    bus,
                    address,
                    steps,
                });
            }
            None if self.config.interface_kind() == Some(InterfaceKind::I2c) => {
                // One register and an optional value per line
                for _ in 0..2 {
                    match cursor.next_hex() {
                        Some(Some(byte)) => self.init.push(byte as u8),
                        Some(None) => self.issue(IssueKind::MalformedValue("init byte")),
                        None => break,
                    }
                }
            }
            None => {
                let mut bytes = core::mem::take(&mut self.init);
                self.hex_list(cursor, &mut bytes);
                self.init = bytes;
            }
        }
    }

    fn timing(&mut self, cursor: &mut Cursor<'_>) {
        let mut values = [0u16; 9];
        match self.config.interface_kind() {
            Some(InterfaceKind::Rgb) => {
                for value in &mut values {
                    *value = clamp_u16(self.int(cursor, "rgb timing").unwrap_or(0));
                }
                self.config.rgb_timing = Some(RgbTiming {
                    hsync_idle_low: values[0] == 0,
                    hsync_front_porch: values[1],
                    hsync_pulse_width: values[2],
                    hsync_back_porch: values[3],
                    vsync_idle_low: values[4] == 0,
                    vsync_front_porch: values[5],
                    vsync_pulse_width: values[6],
                    vsync_back_porch: values[7],
                    pclk_active_neg: values[8] != 0,
                });
            }
            Some(InterfaceKind::Dsi) => {
                for value in values.iter_mut().take(6) {
                    *value = clamp_u16(self.int(cursor, "dsi timing").unwrap_or(0));
                }
                self.config.dsi_timing = Some(DsiTiming {
                    h_front_porch: values[0],
                    v_front_porch: values[1],
                    h_back_porch: values[2],
                    h_sync_width: values[3],
                    v_sync_width: values[4],
                    v_back_porch: values[5],
                });
            }
            _ => self.issue(IssueKind::NotForInterface('V')),
        }
    }

    fn rotation(&mut self, index: usize, cursor: &mut Cursor<'_>) {
        if !self.is_rgb() {
            if let Some(value) = self.hex(cursor, "rotation value") {
                self.config.rotations[index].value = value as u8;
            }
            if let Some(offset) = self.hex(cursor, "x offset") {
                self.config.rotations[index].x_offset = offset as u16;
            }
            if let Some(offset) = self.hex(cursor, "y offset") {
                self.config.rotations[index].y_offset = offset as u16;
            }
        }
        if let Some(transform) = self.int(cursor, "transform") {
            self.config.rotations[index].transform = (transform & 3) as u8;
        }
    }

    fn address(&mut self, cursor: &mut Cursor<'_>) {
        let paged = self.config.interface_kind() == Some(InterfaceKind::I2c) || self.config.bpp() == 1;
        if paged {
            self.read_hex_u8(cursor, "set x", |c, v| c.address.set_x = v);
            self.read_hex_u8(cursor, "page start", |c, v| c.pages.page_start = v);
            self.read_hex_u8(cursor, "page end", |c, v| c.pages.page_end = v);
            self.read_hex_u8(cursor, "set y", |c, v| c.address.set_y = v);
            self.read_hex_u8(cursor, "col start", |c, v| c.pages.col_start = v);
            self.read_hex_u8(cursor, "col end", |c, v| c.pages.col_end = v);
            self.config.address.write_ram = self.opcode(cursor, "write ram");
        } else {
            self.read_hex_u8(cursor, "set x", |c, v| c.address.set_x = v);
            self.read_hex_u8(cursor, "set y", |c, v| c.address.set_y = v);
            self.config.address.write_ram = self.opcode(cursor, "write ram");
            if let Some(bits) = self.int(cursor, "address mode") {
                self.config.address.mode = if bits == 8 {
                    AddressMode::Byte
                } else {
                    AddressMode::Word
                };
            }
        }
    }

    fn splash(&mut self, cursor: &mut Cursor<'_>) {
        let Some(font) = self.int(cursor, "splash font") else {
            return;
        };
        if font < 0 {
            self.config.splash = None;
            return;
        }
        let size = self.int(cursor, "splash size").unwrap_or(1);
        let foreground = clamp_u16(self.int(cursor, "splash foreground").unwrap_or(0));
        let background = clamp_u16(self.int(cursor, "splash background").unwrap_or(0));
        self.config.splash = Some(Splash {
            font: font.min(255) as u8,
            size: size.clamp(0, 255) as u8,
            foreground,
            background,
            x: self.int(cursor, "splash x").unwrap_or(0),
            y: self.int(cursor, "splash y").unwrap_or(0),
        });
    }

    fn lut_slot(&mut self, target: LutTarget) -> &mut Option<LutTable> {
        let luts = &mut self.config.luts;
        match target {
            LutTarget::Full => &mut luts.full,
            LutTarget::Partial => &mut luts.partial,
            LutTarget::Indexed(index) => &mut luts.indexed[index],
        }
    }

    fn lut_header(&mut self, target: LutTarget, cursor: &mut Cursor<'_>) {
        let size = self
            .int(cursor, "lut size")
            .map_or(0, |size| usize::try_from(size).unwrap_or(0));
        let command = self.hex(cursor, "lut command").map_or(0xFF, |cmd| cmd as u8);
        let table = LutTable::try_new(size, command);
        self.lut_lines.retain(|(seen, _)| *seen != target);
        if table.is_some() {
            self.lut = Some(target);
            self.lut_lines.push((target, self.line));
        } else {
            self.issue(IssueKind::LutTooLarge { declared: size });
            self.lut = None;
        }
        *self.lut_slot(target) = table;
    }

    fn lut_data(&mut self, cursor: &mut Cursor<'_>) {
        let Some(target) = self.lut else {
            return;
        };
        let mut bytes = Vec::new();
        self.hex_list(cursor, &mut bytes);
        let dropped = match self.lut_slot(target) {
            Some(table) => table.fill(&bytes),
            None => bytes.len(),
        };
        if dropped > 0 {
            self.issue(IssueKind::LutOverflow { dropped });
        }
    }

    fn finish(mut self) -> Parsed {
        for (target, line) in core::mem::take(&mut self.lut_lines) {
            let incomplete = self
                .lut_slot(target)
                .as_ref()
                .filter(|table| !table.is_complete())
                .map(|table| (table.declared, table.data.len()));
            if let Some((declared, filled)) = incomplete {
                self.line = line;
                self.issue(IssueKind::IncompleteLut { declared, filled });
            }
        }

        let config = &mut self.config;
        let init_len = self.init.len();
        let full_len = self.full.len();
        let partial_len = self.partial.len();
        config.commands = Vec::with_capacity(init_len + full_len + partial_len);
        config.commands.append(&mut self.init);
        config.commands.append(&mut self.full);
        config.commands.append(&mut self.partial);
        config.init = CommandTable {
            offset: 0,
            len: init_len,
        };
        config.epd_full = (full_len > 0).then_some(CommandTable {
            offset: init_len,
            len: full_len,
        });
        config.epd_partial = (partial_len > 0).then_some(CommandTable {
            offset: init_len + full_len,
            len: partial_len,
        });
        config.epd_mode = config.derive_epd_mode();
        if let Some(mode) = config.epd_mode {
            debug!("descriptor {}: e-paper mode {:?}", config.name, mode);
        }

        Parsed {
            config: self.config,
            issues: self.issues,
        }
    }
}

fn clamp_u16(value: i32) -> u16 {
    value.clamp(0, u16::MAX as i32) as u16
}
