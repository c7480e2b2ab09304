use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenOptions: u32 {
        const ONE_SHOT = 0x1;
        const CREATE = 0x2;
        const TRUNCATE = 0x4;
        const READ_DELTA = 0x10;
        const SERVER = 0x100;
        const CRITICAL = 0x200;
        const NO_PERSIST = 0x400;
    }
}

impl OpenOptions {
    pub const MONITOR: Self = Self::empty();
    pub const NO_CREATE: Self = Self::empty();
    pub const READ_FULL: Self = Self::empty();
    pub const CLIENT: Self = Self::empty();
    pub const PERSIST: Self = Self::empty();

    pub fn is_one_shot(self) -> bool {
        self.contains(Self::ONE_SHOT)
    }

    pub fn query(self, notify: Option<&str>) -> String {
        let mut parts = Vec::new();
        if let Some(notify) = notify {
            parts.push(format!("notify={notify}"));
        }
        for (flag, name) in [
            (Self::READ_DELTA, "delta"),
            (Self::SERVER, "server"),
            (Self::CRITICAL, "critical"),
            (Self::NO_PERSIST, "nopersist"),
        ] {
            if self.contains(flag) {
                parts.push(name.to_string());
            }
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join(","))
        }
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::MONITOR | Self::READ_FULL | Self::CLIENT | Self::CREATE
    }
}
