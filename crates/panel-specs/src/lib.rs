//! Panel Specifications
//!
//! Everything the panel bus driver needs to know about a display controller
//! and about pixel formats, kept free of any bus logic:
//!
//! - **[`Panel`]** - the collaborator interface the driver talks to
//! - **[`PanelSpec`] / [`GenericPanel`]** - describe a panel as `const` data
//! - **Command lists** - encode and decode `opcode, argc, args, delay` streams
//! - **Window packing** - 8-bit or big-endian 16-bit address payloads
//! - **Colour conversion** - wire encodings and image/read-back converters
//!
//! # Example
//!
//! ```
//! use panel_specs::{CommandList, CMD_INIT_DELAY};
//!
//! let init = [0x01, CMD_INIT_DELAY, 120, 0x29, 0, 0xFF, 0xFF];
//! let opcodes: Vec<u8> = CommandList::new(&init).map(|c| c.opcode).collect();
//! assert_eq!(opcodes, [0x01, 0x29]);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod color;
pub mod command;
pub mod panel;
mod panel_spec;
pub mod pixel;
pub mod window;

pub use color::{ColorConverter, ColorDepth};
pub use command::{Command, CommandBuf, CommandError, CommandList, CMD_INIT_DELAY};
pub use panel::{ClockTargets, Opcodes, Panel};
pub use panel_spec::{DepthCodes, GenericPanel, PanelSpec};
pub use pixel::{DepthConverter, ImageSource, PixelCopy, PixelRead, RawImage};
pub use window::{pack_window_addr16, pack_window_addr32, AddressWidth};
