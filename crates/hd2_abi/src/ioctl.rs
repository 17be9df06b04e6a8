use dataview::Pod;
use strum::FromRepr;

/// The three standard whences a buffer file's `seek` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Start,
    Current,
    End,
}

/// Number of buffer roles a single `SETUP` can bind.
pub const ROLE_COUNT: usize = 7;

/// The seven roles a bound buffer can fill, in the wire order used by
/// [`SetupArgs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Role {
    SurfaceDst = 0,
    SurfaceSrc = 1,
    Texture = 2,
    Flat = 3,
    Colormap = 4,
    Translation = 5,
    Tranmap = 6,
}

impl Role {
    #[must_use]
    pub const fn is_surface(self) -> bool {
        matches!(self, Self::SurfaceDst | Self::SurfaceSrc)
    }
}

/// Argument to `CREATE_SURFACE`.
#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
pub struct CreateSurfaceArgs {
    pub width: u16,
    pub height: u16,
}

/// Argument to `CREATE_BUFFER`.
#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
pub struct CreateBufferArgs {
    pub size: u32,
}

/// Argument to `SETUP`: one file descriptor per role, or `-1` to leave that
/// role unbound. Order matches [`Role`]'s discriminants.
#[derive(Debug, Clone, Copy, Pod)]
#[repr(C)]
pub struct SetupArgs {
    pub surf_dst_fd: i32,
    pub surf_src_fd: i32,
    pub texture_fd: i32,
    pub flat_fd: i32,
    pub colormap_fd: i32,
    pub translation_fd: i32,
    pub tranmap_fd: i32,
}

impl SetupArgs {
    /// `fd` for the given role, in wire order.
    #[must_use]
    pub const fn fd(&self, role: Role) -> i32 {
        match role {
            Role::SurfaceDst => self.surf_dst_fd,
            Role::SurfaceSrc => self.surf_src_fd,
            Role::Texture => self.texture_fd,
            Role::Flat => self.flat_fd,
            Role::Colormap => self.colormap_fd,
            Role::Translation => self.translation_fd,
            Role::Tranmap => self.tranmap_fd,
        }
    }
}

const _: () = {
    assert!(size_of::<CreateSurfaceArgs>() == 4);
    assert!(size_of::<CreateBufferArgs>() == 4);
    assert!(size_of::<SetupArgs>() == 4 * ROLE_COUNT);
    assert!(ROLE_COUNT == hd2_params::NUM_ROLES);
};
