use bitflags::bitflags;

bitflags! {
    // Low 3 bits of the packed control/length header word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CtrlFlags: u16 {
        const ACK = 1 << 0;
        const SYN = 1 << 1;
        const FIN = 1 << 2;
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use crate::rdt::flags::CtrlFlags;

    #[test]
    fn test_ctrl_flags() {
        assert_eq!(CtrlFlags::ACK.bits(), 0b001);
        assert_eq!(CtrlFlags::SYN.bits(), 0b010);
        assert_eq!(CtrlFlags::FIN.bits(), 0b100);

        let combined = CtrlFlags::ACK | CtrlFlags::SYN | CtrlFlags::FIN;
        assert_eq!(combined.bits(), 0b111);
    }
}
