use bitflags::bitflags;

bitflags! {
    /// Access and property flags of classes, fields, methods and inner classes.
    ///
    /// Some bits mean different things depending on where they appear (`SUPER` on a class is
    /// `SYNCHRONIZED` on a method), so both names are defined for the same bit. Every one of the
    /// sixteen bits has a name, so [`AccessFlags::from_bits_truncate`] never loses information.
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
        const MANDATED = 0x8000;
    }
}
