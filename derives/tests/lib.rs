use bitflags::bitflags;
use derives::KebabFlags;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq, KebabFlags)]
    pub struct Checks: u8 {
        const DIR = 1 << 0;
        const SNEAK_DIR = 1 << 1;
        const TRACE = 1 << 3;
    }
}

#[test]
fn flag_names() {
    assert_eq!(idm::to_string(&Checks::empty()).unwrap(), "-");
    assert_eq!(idm::from_str::<Checks>("-").unwrap(), Checks::empty());

    assert_eq!(idm::to_string(&Checks::SNEAK_DIR).unwrap(), "sneak-dir");
    assert_eq!(idm::from_str::<Checks>("trace").unwrap(), Checks::TRACE);

    assert_eq!(
        idm::to_string(&(Checks::DIR | Checks::TRACE)).unwrap(),
        "dir trace"
    );
    assert_eq!(
        idm::from_str::<Checks>("trace sneak-dir").unwrap(),
        Checks::SNEAK_DIR | Checks::TRACE
    );

    assert!(idm::from_str::<Checks>("dir lighting").is_err());
}

#[test]
fn raw_bits() {
    assert_eq!(
        idm::from_str::<Checks>("9").unwrap(),
        Checks::DIR | Checks::TRACE
    );
    assert_eq!(idm::from_str::<Checks>("0x02").unwrap(), Checks::SNEAK_DIR);
    // Bit 2 is not a known flag and gets dropped.
    assert_eq!(idm::from_str::<Checks>("0x05").unwrap(), Checks::DIR);
    assert!(idm::from_str::<Checks>("300").is_err());
}

#[test]
fn display() {
    assert_eq!(Checks::empty().to_string(), "-");
    assert_eq!((Checks::DIR | Checks::SNEAK_DIR).to_string(), "dir sneak-dir");
}

#[test]
fn tail_flags() {
    #[derive(Debug, Eq, PartialEq, serde::Deserialize)]
    struct Row {
        x: i32,
        y: i32,
        checks: Checks,
    }

    assert_eq!(
        idm::from_str::<Row>("1 2 -").unwrap(),
        Row {
            x: 1,
            y: 2,
            checks: Checks::empty()
        }
    );
    assert_eq!(
        idm::from_str::<Row>("1 2 dir trace").unwrap(),
        Row {
            x: 1,
            y: 2,
            checks: Checks::DIR | Checks::TRACE
        }
    );
}
