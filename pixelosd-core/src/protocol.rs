//! The OSD opcode catalog and wire-level constants.

/// Maximum number of bytes buffered before a flush is forced.
pub const MAX_SEND_BUFFER_SIZE: usize = 254;

/// Maximum accepted frame payload length; longer lengths are a framing error.
pub const MAX_FRAME_LENGTH: u32 = 2048;

/// How many bytes the frame decoder will scan looking for the `$` marker
/// before giving up.
pub const MARKER_SCAN_LIMIT: usize = 1000;

/// Sentinel address that terminates a firmware flash sequence: `(2 << 31) - 1`
/// evaluated as an unbounded integer, i.e. `u32::MAX`.
pub const FLASH_WRITE_END: u32 = u32::MAX;

/// Maximum payload carried by a single `WRITE_FLASH` / VM storage chunk.
pub const MAX_TRANSFER_BLOCK_SIZE: usize = 64;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
	Error = 0,
	Info = 1,
	ReadFont = 2,
	WriteFont = 3,
	GetActiveCamera = 6,

	TransactionBegin = 16,
	TransactionCommit = 17,
	TransactionBeginProfiled = 18,

	SetStrokeColor = 22,
	SetFillColor = 23,
	SetStrokeAndFillColor = 24,
	SetColorInversion = 25,
	SetPixel = 26,
	SetPixelToStrokeColor = 27,
	SetPixelToFillColor = 28,
	SetStrokeWidth = 29,
	SetLineOutlineType = 30,
	SetLineOutlineColor = 31,

	ClipToRect = 40,
	ClearScreen = 41,
	ClearRect = 42,
	DrawingReset = 43,
	DrawBitmap = 44,
	DrawBitmapMask = 45,
	DrawChar = 46,
	DrawCharMask = 47,
	DrawStr = 48,
	DrawStrMask = 49,
	MoveToPoint = 50,
	StrokeLineToPoint = 51,
	StrokeTriangle = 52,
	FillTriangle = 53,
	FillStrokeTriangle = 54,
	StrokeRect = 55,
	FillRect = 56,
	FillStrokeRect = 57,
	StrokeEllipseInRect = 58,
	FillEllipseInRect = 59,
	FillStrokeEllipseInRect = 60,

	CtmReset = 80,
	CtmSet = 81,
	CtmTranslate = 82,
	CtmScale = 83,
	CtmRotate = 84,
	CtmRotateAbout = 85,
	CtmShear = 86,
	CtmShearAbout = 87,
	CtmMultiply = 88,
	CtmTranslateRev = 89,

	ContextPush = 100,
	ContextPop = 101,

	DrawGridChr = 110,
	DrawGridStr = 111,
	DrawGridChrV2 = 112,
	DrawGridStrV2 = 113,

	WidgetSetConfig = 115,
	WidgetDraw = 116,
	WidgetErase = 117,

	Reboot = 120,
	WriteFlash = 121,
	SetDataRate = 122,

	VmStorageSize = 150,
	VmStorageRead = 151,
	VmStorageWrite = 152,
	VmStart = 153,
	VmLookupSymbol = 154,
	VmExec = 155,
}

impl Opcode {
	pub fn as_u8(self) -> u8 {
		self as u8
	}
}

/// Widget identifiers; sidebars and graphs are addressed by a small caller
/// index that this module maps onto the flat device-side id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetId {
	Ahi,
	Sidebar(u8),
	Graph(u8),
}

impl WidgetId {
	pub fn to_wire(self) -> Result<u8, crate::error::Error> {
		match self {
			WidgetId::Ahi => Ok(0),
			WidgetId::Sidebar(i) if i < 2 => Ok(1 + i),
			WidgetId::Graph(i) if i < 4 => Ok(3 + i),
			other => Err(crate::error::Error::Config(format!("widget index out of range: {other:?}"))),
		}
	}
}
