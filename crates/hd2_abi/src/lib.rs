//! Wire format shared between userspace and the driver core.
//!
//! This crate mirrors the fixed hardware ABI (`doomdev2.h` / `harddoom2.h` in
//! vendor terms): the 32-byte user command records accepted by `write`, the
//! device's 8-word command format, and the error codes returned across the
//! ioctl/read/write boundary. None of it depends on an OS; the driver core in
//! the `hd2` crate is the only consumer.
#![no_std]

mod command;
mod errno;
mod flags;
mod ioctl;
mod reg;

pub use self::{
    command::{
        CMD_RECORD_BYTES, CmdCopyRect, CmdDrawBackground, CmdDrawColumn, CmdDrawFuzz,
        CmdDrawLine, CmdDrawSpan, CmdFillRect, CommandType, DeviceWords, UserCommand,
    },
    errno::Errno,
    flags::{CommandFlags, InterruptFlags, SetupCommandFlags, UserCmdFlags},
    ioctl::{CreateBufferArgs, CreateSurfaceArgs, ROLE_COUNT, Role, SeekWhence, SetupArgs},
    reg::MmioRegister,
};
