//! Device configuration produced by the descriptor parser
//!
//! [`DeviceConfig`] describes one display model: its geometry, wiring, the
//! opcodes its controller understands, and the encoded command tables used
//! to initialize and refresh it. Fields are public and filled in once by
//! [`descriptor::parse`](crate::descriptor::parse); everything that is not
//! mentioned in a descriptor keeps the value from [`Default`].

use alloc::string::String;
use alloc::vec::Vec;

use crate::color::palette;
use crate::command::WRITE_LUT;

/// Default number of lines a caller should batch per flush
pub const DEFAULT_FLUSH_LINES: u16 = 40;

/// Default start-line value for controllers with 8-bit addressing
pub const DEFAULT_START_LINE: u8 = 0xA1;

/// Number of indexed LUT tables in five-table mode
pub const INDEXED_LUT_COUNT: usize = 5;

/// Largest waveform table a descriptor may declare
pub const MAX_LUT_LEN: usize = 1024;

/// A GPIO number from a descriptor, `None` when given as -1
pub type Pin = Option<u8>;

/// Physical interface family
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceKind {
    /// 4-wire SPI
    Spi,
    /// I2C
    I2c,
    /// 8-bit parallel bus
    Parallel8,
    /// 16-bit parallel bus
    Parallel16,
    /// Continuously refreshed RGB timing panel
    Rgb,
    /// Packet-based serial panel
    Dsi,
}

/// SPI wiring
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpiWiring {
    /// Bus number
    pub bus: u8,
    /// Chip select
    pub cs: Pin,
    /// Clock
    pub clk: Pin,
    /// Data out
    pub mosi: Pin,
    /// Data/command select
    pub dc: Pin,
    /// Backlight
    pub backlight: Pin,
    /// Reset
    pub reset: Pin,
    /// Data in, doubles as the busy line on e-paper panels
    pub miso: Pin,
    /// Clock speed in MHz
    pub speed: u32,
}

/// I2C wiring
#[derive(Clone, Debug, Default, PartialEq)]
pub struct I2cWiring {
    /// Bus number, 1 for the `I2C2` keyword
    pub bus: u8,
    /// 7-bit device address
    pub address: u8,
    /// Clock
    pub scl: Pin,
    /// Data
    pub sda: Pin,
    /// Reset
    pub reset: Pin,
}

/// Parallel bus wiring
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParallelWiring {
    /// Bus width, 8 or 16
    pub width: u8,
    /// Reset
    pub reset: Pin,
    /// Chip select
    pub cs: Pin,
    /// Register select (data/command)
    pub rs: Pin,
    /// Write strobe
    pub wr: Pin,
    /// Read strobe
    pub rd: Pin,
    /// Backlight
    pub backlight: Pin,
    /// Data pins D0..D15, the upper half is unused on an 8-bit bus
    pub data: [Pin; 16],
    /// Bus speed in MHz
    pub speed: u32,
}

/// RGB timing panel wiring
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RgbWiring {
    /// Data enable
    pub de: Pin,
    /// Vertical sync
    pub vsync: Pin,
    /// Horizontal sync
    pub hsync: Pin,
    /// Pixel clock
    pub pclk: Pin,
    /// Backlight
    pub backlight: Pin,
    /// Data pins, RGB565 order
    pub data: [Pin; 16],
    /// Pixel clock in Hz
    pub speed: u32,
}

/// DSI panel wiring and link parameters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DsiWiring {
    /// Number of data lanes
    pub lanes: u8,
    /// Tearing effect input
    pub te: Pin,
    /// Backlight
    pub backlight: Pin,
    /// Reset
    pub reset: Pin,
    /// LDO channel powering the PHY
    pub ldo_channel: i32,
    /// LDO voltage in millivolts
    pub ldo_millivolts: u32,
    /// Pixel clock in Hz
    pub pixel_clock: u32,
    /// Lane bit rate in Mbps
    pub lane_speed: u32,
    /// Color element order
    pub rgb_order: u8,
    /// Data endianness
    pub endian: u8,
}

/// Wiring for the interface a descriptor selected
#[derive(Clone, Debug, PartialEq)]
pub enum InterfaceConfig {
    /// `SPI`
    Spi(SpiWiring),
    /// `I2C` or `I2C2`
    I2c(I2cWiring),
    /// `PAR`
    Parallel(ParallelWiring),
    /// `RGB`
    Rgb(RgbWiring),
    /// `DSI`
    Dsi(DsiWiring),
}

impl InterfaceConfig {
    /// Interface family
    pub fn kind(&self) -> InterfaceKind {
        match self {
            Self::Spi(_) => InterfaceKind::Spi,
            Self::I2c(_) => InterfaceKind::I2c,
            Self::Parallel(wiring) if wiring.width == 8 => InterfaceKind::Parallel8,
            Self::Parallel(_) => InterfaceKind::Parallel16,
            Self::Rgb(_) => InterfaceKind::Rgb,
            Self::Dsi(_) => InterfaceKind::Dsi,
        }
    }

    /// Reset pin, where the interface has one
    pub fn reset_pin(&self) -> Pin {
        match self {
            Self::Spi(wiring) => wiring.reset,
            Self::I2c(wiring) => wiring.reset,
            Self::Parallel(wiring) => wiring.reset,
            Self::Dsi(wiring) => wiring.reset,
            Self::Rgb(_) => None,
        }
    }

    /// Busy input, only SPI e-paper panels have one (wired to MISO)
    pub fn busy_pin(&self) -> Pin {
        match self {
            Self::Spi(wiring) => wiring.miso,
            _ => None,
        }
    }
}

/// Whether the panel shows colors or just on/off pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorType {
    /// 1 bpp
    #[default]
    Mono,
    /// 16 or 18 bpp
    Color,
}

/// Splash screen shown by [`Display::init_display`](crate::Display::init_display)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Splash {
    /// Font number
    pub font: u8,
    /// Font scale
    pub size: u8,
    /// Foreground, a palette index on 16 bpp panels, a raw color otherwise
    pub foreground: u16,
    /// Background, a palette index on 16 bpp panels, a raw color otherwise
    pub background: u16,
    /// Text x position
    pub x: i32,
    /// Text y position
    pub y: i32,
}

impl Splash {
    /// Resolve the background color for a panel of depth `bpp`
    pub fn background_color(&self, bpp: u8) -> u16 {
        resolve_color(self.background, bpp)
    }

    /// Resolve the foreground color for a panel of depth `bpp`
    pub fn foreground_color(&self, bpp: u8) -> u16 {
        resolve_color(self.foreground, bpp)
    }
}

fn resolve_color(value: u16, bpp: u8) -> u16 {
    if bpp == 16 {
        palette(value as usize)
    } else {
        value
    }
}

/// A range of the shared command buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandTable {
    /// First byte
    pub offset: usize,
    /// Length in bytes
    pub len: usize,
}

/// How window coordinates are sent
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressMode {
    /// One 32-bit word `start << 16 | end` per axis
    #[default]
    Word,
    /// Individual bytes, for controllers with 8-bit addressing
    Byte,
}

impl AddressMode {
    /// Descriptor value for this mode
    pub const fn bits(self) -> i32 {
        match self {
            Self::Word => 16,
            Self::Byte => 8,
        }
    }
}

/// Addressing opcodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressCommands {
    /// Column (x) window command
    pub set_x: u8,
    /// Row (y) window command, doubles as the page offset on paged panels
    pub set_y: u8,
    /// Memory write command
    pub write_ram: Option<u8>,
    /// Coordinate encoding
    pub mode: AddressMode,
}

/// Page and column window of a paged controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageWindow {
    /// First page
    pub page_start: u8,
    /// Last page
    pub page_end: u8,
    /// First column
    pub col_start: u8,
    /// Last column
    pub col_end: u8,
}

/// Per-rotation setup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RotationEntry {
    /// Memory access value, 0xFF disables it
    pub value: u8,
    /// Offset added to x window coordinates
    pub x_offset: u16,
    /// Offset added to y window coordinates
    pub y_offset: u16,
    /// Transform index used by touch mapping
    pub transform: u8,
}

/// An e-paper waveform table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LutTable {
    /// Command that loads the table
    pub command: u8,
    /// Size declared in the descriptor
    pub declared: usize,
    /// Bytes supplied so far
    pub data: Vec<u8>,
}

impl LutTable {
    /// Create an empty table with room for `declared` bytes
    ///
    /// Returns `None` when `declared` exceeds [`MAX_LUT_LEN`] or the memory
    /// is not available.
    pub fn try_new(declared: usize, command: u8) -> Option<Self> {
        if declared > MAX_LUT_LEN {
            return None;
        }
        let mut data = Vec::new();
        data.try_reserve_exact(declared).ok()?;
        Some(Self {
            command,
            declared,
            data,
        })
    }

    /// Whether the table holds exactly its declared size
    pub fn is_complete(&self) -> bool {
        self.declared > 0 && self.data.len() == self.declared
    }

    /// Command that loads this table, the SSD16xx default when none was declared
    pub fn load_command(&self) -> u8 {
        if self.command == 0xFF {
            WRITE_LUT
        } else {
            self.command
        }
    }

    /// Append bytes, ignoring anything past the declared size
    ///
    /// Returns the number of bytes dropped.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let room = self.declared - self.data.len().min(self.declared);
        let taken = bytes.len().min(room);
        self.data.extend_from_slice(&bytes[..taken]);
        bytes.len() - taken
    }
}

/// All waveform tables of a device
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LutSet {
    /// Full-refresh table (two-table mode)
    pub full: Option<LutTable>,
    /// Partial-refresh table (two-table mode)
    pub partial: Option<LutTable>,
    /// Indexed tables 1..=5 (five-table mode)
    pub indexed: [Option<LutTable>; INDEXED_LUT_COUNT],
}

impl LutSet {
    /// Bytes filled in the full table
    pub fn full_len(&self) -> usize {
        self.full.as_ref().map_or(0, |lut| lut.data.len())
    }

    /// Bytes filled in the partial table
    pub fn partial_len(&self) -> usize {
        self.partial.as_ref().map_or(0, |lut| lut.data.len())
    }

    /// Bytes filled in indexed table `index` (0-based)
    pub fn indexed_len(&self, index: usize) -> usize {
        self.indexed
            .get(index)
            .and_then(Option::as_ref)
            .map_or(0, |lut| lut.data.len())
    }
}

/// E-paper refresh protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpdMode {
    /// Full and partial LUT uploaded before each refresh
    TwoTable,
    /// Five indexed LUTs and a two-plane frame write
    FiveTable,
    /// Refresh driven entirely by descriptor command tables
    CommandSequence,
}

/// E-paper timing constants, in units of 10 ms
#[derive(Clone, Debug, PartialEq)]
pub struct EpdTiming {
    /// Hold after a full refresh
    pub full: u16,
    /// Hold after a partial refresh
    pub partial: u16,
    /// Busy wait after a display activation
    pub update: u16,
}

impl Default for EpdTiming {
    fn default() -> Self {
        Self {
            full: 350,
            partial: 35,
            update: 10,
        }
    }
}

/// Transfer hints from the `B` section
#[derive(Clone, Debug, PartialEq)]
pub struct TransferHints {
    /// Lines a caller should batch per flush
    pub flush_lines: u16,
    /// Bulk pixel pushes may use a DMA engine
    pub use_dma: bool,
    /// Incoming pixel data is byte-swapped
    pub swap_color: bool,
    /// DMA transfers may complete asynchronously
    pub async_dma: bool,
    /// Busy line is active low
    pub busy_invert: bool,
    /// 1 bpp polarity is reversed
    pub invert_bw: bool,
    /// A resistive touch controller shares the bus
    pub resistive_touch: bool,
}

impl Default for TransferHints {
    fn default() -> Self {
        Self {
            flush_lines: DEFAULT_FLUSH_LINES,
            use_dma: false,
            swap_color: false,
            async_dma: false,
            busy_invert: false,
            invert_bw: false,
            resistive_touch: false,
        }
    }
}

impl TransferHints {
    /// Apply a descriptor flags byte
    pub fn set_flags(&mut self, flags: u8) {
        self.use_dma = flags & 0x01 != 0;
        self.swap_color = flags & 0x02 != 0;
        self.async_dma = flags & 0x04 != 0;
        self.busy_invert = flags & 0x08 != 0;
        self.invert_bw = flags & 0x10 != 0;
        self.resistive_touch = flags & 0x20 != 0;
    }

    /// Descriptor flags byte
    pub fn flags(&self) -> u8 {
        u8::from(self.use_dma)
            | u8::from(self.swap_color) << 1
            | u8::from(self.async_dma) << 2
            | u8::from(self.busy_invert) << 3
            | u8::from(self.invert_bw) << 4
            | u8::from(self.resistive_touch) << 5
    }
}

/// Raw touch range mapped onto the panel
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RotationMap {
    /// Minimum raw x
    pub x_min: i32,
    /// Maximum raw x
    pub x_max: i32,
    /// Minimum raw y
    pub y_min: i32,
    /// Maximum raw y
    pub y_max: i32,
}

/// RGB panel sync timings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RgbTiming {
    /// HSYNC idles low
    pub hsync_idle_low: bool,
    /// Horizontal front porch
    pub hsync_front_porch: u16,
    /// HSYNC pulse width
    pub hsync_pulse_width: u16,
    /// Horizontal back porch
    pub hsync_back_porch: u16,
    /// VSYNC idles low
    pub vsync_idle_low: bool,
    /// Vertical front porch
    pub vsync_front_porch: u16,
    /// VSYNC pulse width
    pub vsync_pulse_width: u16,
    /// Vertical back porch
    pub vsync_back_porch: u16,
    /// Data latched on the falling pixel clock edge
    pub pclk_active_neg: bool,
}

/// DSI video timings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DsiTiming {
    /// Horizontal front porch
    pub h_front_porch: u16,
    /// Vertical front porch
    pub v_front_porch: u16,
    /// Horizontal back porch
    pub h_back_porch: u16,
    /// HSYNC width
    pub h_sync_width: u16,
    /// VSYNC width
    pub v_sync_width: u16,
    /// Vertical back porch
    pub v_back_porch: u16,
}

/// One line of an I2C side-channel init
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum I2cInitStep {
    /// Write `value` to `register`
    Register(u8, u8),
    /// Wait this many milliseconds
    Delay(u8),
}

/// Register interface of an RGB panel, used only during init
#[derive(Clone, Debug, PartialEq)]
pub enum SideInit {
    /// Bit-banged 3-wire SPI, `:IS`
    Spi {
        /// Clock
        clk: Pin,
        /// Data out
        mosi: Pin,
        /// Chip select
        cs: Pin,
        /// Reset
        reset: Pin,
        /// Encoded stream with 7-bit argument counts
        stream: Vec<u8>,
    },
    /// I2C register writes, `:II`
    I2c {
        /// Bus number
        bus: u8,
        /// 7-bit device address
        address: u8,
        /// Register writes and delays, in order
        steps: Vec<I2cInitStep>,
    },
}

/// Everything a descriptor says about one display model
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// Model name
    pub name: String,
    /// Physical width in pixels
    pub width: u16,
    /// Physical height in pixels
    pub height: u16,
    /// Declared depth, negative values mark a variant of the same depth
    pub depth: i16,
    /// Interface and wiring, `None` when the header named no known interface
    pub interface: Option<InterfaceConfig>,
    /// Splash screen, `None` when no `S` line was given
    pub splash: Option<Splash>,
    /// Init, full-refresh and partial-refresh tables, back to back
    pub commands: Vec<u8>,
    /// Init table range
    pub init: CommandTable,
    /// E-paper full refresh table
    pub epd_full: Option<CommandTable>,
    /// E-paper partial refresh table
    pub epd_partial: Option<CommandTable>,
    /// Send command arguments as command bytes
    pub all_commands: bool,
    /// Addressing opcodes
    pub address: AddressCommands,
    /// Page window for paged controllers
    pub pages: PageWindow,
    /// Pixel format on the wire, 16 or 18
    pub color_mode: u8,
    /// Display on opcode
    pub display_on: Option<u8>,
    /// Display off opcode
    pub display_off: Option<u8>,
    /// Inversion on opcode
    pub invert_on: Option<u8>,
    /// Inversion off opcode
    pub invert_off: Option<u8>,
    /// Brightness opcode
    pub dim_opcode: Option<u8>,
    /// Memory access command
    pub memory_access: Option<u8>,
    /// Start-line command for 8-bit addressing
    pub start_line: u8,
    /// Setup per rotation 0..=3
    pub rotations: [RotationEntry; 4],
    /// Waveform tables
    pub luts: LutSet,
    /// Refresh timing
    pub epd_timing: EpdTiming,
    /// Refresh protocol, `None` for panels that are not e-paper
    pub epd_mode: Option<EpdMode>,
    /// Transfer hints
    pub transfer: TransferHints,
    /// Touch range
    pub rotation_map: Option<RotationMap>,
    /// Bit-packing mode
    pub bit_packing: u8,
    /// RGB timings
    pub rgb_timing: Option<RgbTiming>,
    /// DSI timings
    pub dsi_timing: Option<DsiTiming>,
    /// Side-channel init for RGB panels
    pub side_init: Option<SideInit>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            width: 0,
            height: 0,
            depth: 0,
            interface: None,
            splash: None,
            commands: Vec::new(),
            init: CommandTable::default(),
            epd_full: None,
            epd_partial: None,
            all_commands: false,
            address: AddressCommands::default(),
            pages: PageWindow::default(),
            color_mode: 16,
            display_on: None,
            display_off: None,
            invert_on: None,
            invert_off: None,
            dim_opcode: None,
            memory_access: None,
            start_line: DEFAULT_START_LINE,
            rotations: [0, 1, 2, 3].map(|transform| RotationEntry {
                value: 0,
                x_offset: 0,
                y_offset: 0,
                transform,
            }),
            luts: LutSet::default(),
            epd_timing: EpdTiming::default(),
            epd_mode: None,
            transfer: TransferHints::default(),
            rotation_map: None,
            bit_packing: 0,
            rgb_timing: None,
            dsi_timing: None,
            side_init: None,
        }
    }
}

impl DeviceConfig {
    /// Absolute bit depth
    pub fn bpp(&self) -> u8 {
        self.depth.unsigned_abs().min(u8::MAX as u16) as u8
    }

    /// Color type derived from the depth
    pub fn color_type(&self) -> ColorType {
        if self.bpp() == 1 {
            ColorType::Mono
        } else {
            ColorType::Color
        }
    }

    /// Interface family, if any
    pub fn interface_kind(&self) -> Option<InterfaceKind> {
        self.interface.as_ref().map(InterfaceConfig::kind)
    }

    /// Whether the device is an e-paper panel
    pub fn is_epaper(&self) -> bool {
        self.epd_mode.is_some()
    }

    /// Bytes of a command table range, empty when out of bounds
    pub fn table(&self, table: CommandTable) -> &[u8] {
        self.commands
            .get(table.offset..table.offset + table.len)
            .unwrap_or(&[])
    }

    /// Init table bytes
    pub fn init_commands(&self) -> &[u8] {
        self.table(self.init)
    }

    /// Full refresh table bytes, empty when not declared
    pub fn full_refresh_commands(&self) -> &[u8] {
        self.epd_full.map_or(&[][..], |table| self.table(table))
    }

    /// Partial refresh table bytes, empty when not declared
    pub fn partial_refresh_commands(&self) -> &[u8] {
        self.epd_partial.map_or(&[][..], |table| self.table(table))
    }

    /// Frame buffer size in bytes for this geometry and depth
    pub fn framebuffer_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bpp() as usize / 8
    }

    /// Derive the e-paper refresh protocol from the parsed tables
    ///
    /// Rules apply in order and a later match wins:
    ///
    /// | Condition | Mode |
    /// |---|---|
    /// | full and partial LUTs both hold bytes | two-table |
    /// | LUT 1 holds bytes and LUTs 2..=5 hold equal counts | five-table |
    /// | a refresh table exists and neither full nor partial LUT holds bytes | command sequence |
    pub fn derive_epd_mode(&self) -> Option<EpdMode> {
        let luts = &self.luts;
        let mut mode = None;
        if luts.full_len() > 0 && luts.partial_len() > 0 {
            mode = Some(EpdMode::TwoTable);
        }
        let second = luts.indexed_len(1);
        if luts.indexed_len(0) > 0 && (2..INDEXED_LUT_COUNT).all(|i| luts.indexed_len(i) == second)
        {
            mode = Some(EpdMode::FiveTable);
        }
        let has_tables = self.epd_full.is_some() || self.epd_partial.is_some();
        if has_tables && luts.full_len() == 0 && luts.partial_len() == 0 {
            mode = Some(EpdMode::CommandSequence);
        }
        mode
    }
}
