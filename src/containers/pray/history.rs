use tracing::warn;

use crate::binary_utils::{decode_text, write_lpstring, write_u32, ByteCursor};
use crate::error::{C2eError, C2eResult};

/// Which game wrote a life history. The C3 layout (marker 0x0C) has no
/// trailing Docking Station fields; the DS layout (marker 0x27) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFormat {
    #[default]
    Unknown,
    C3,
    Ds,
}

const MARKER_DS: u8 = 0x27;
const MARKER_C3: u8 = 0x0C;

/// Event-type codes. Codes 0–17 are valid; anything higher terminates
/// event-list decoding.
pub const EVENT_CONCEIVED: u32 = 0;
pub const EVENT_SPLICED: u32 = 1;
pub const EVENT_ENGINEERED: u32 = 2;
pub const EVENT_HATCHED: u32 = 3;
pub const EVENT_AGED: u32 = 4;
pub const EVENT_EXPORTED: u32 = 5;
pub const EVENT_IMPORTED: u32 = 6;
pub const EVENT_DIED: u32 = 7;
pub const EVENT_BECAME_PREGNANT: u32 = 8;
pub const EVENT_IMPREGNATED: u32 = 9;
pub const EVENT_CHILD_BORN: u32 = 10;
pub const EVENT_MUM_LAID_MY_EGG: u32 = 11;
pub const EVENT_LAID_EGG: u32 = 12;
pub const EVENT_PHOTO_TAKEN: u32 = 13;
pub const EVENT_I_AM_CLONED: u32 = 14;
pub const EVENT_CLONED_ME: u32 = 15;
pub const EVENT_WARPED_OUT: u32 = 16;
pub const EVENT_WARPED_IN: u32 = 17;
pub const EVENT_TYPE_LIMIT: u32 = 18;

pub const GENDER_MALE: u32 = 1;
pub const GENDER_FEMALE: u32 = 2;

pub const GENUS_NORN: u32 = 0;
pub const GENUS_GRENDEL: u32 = 1;
pub const GENUS_ETTIN: u32 = 2;

/// Docking-Station-only trailing fields of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DockingInfo {
    pub user: String,
    pub unknown1: u32,
    pub unknown2: u32,
}

/// One timestamped record in a creature's life.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryEvent {
    pub event_type: u32,
    pub world_time: u32,
    pub creature_age: u32,
    pub timestamp: u32,
    pub life_stage: u32,
    pub moniker1: String,
    pub moniker2: String,
    pub user_text: String,
    pub photograph: String,
    pub world_name: String,
    pub world_uid: String,
    pub docking: Option<DockingInfo>,
}

impl HistoryEvent {
    pub fn new(
        event_type: u32,
        world_time: u32,
        creature_age: u32,
        timestamp: u32,
        life_stage: u32,
    ) -> Self {
        HistoryEvent {
            event_type,
            world_time,
            creature_age,
            timestamp,
            life_stage,
            ..Default::default()
        }
    }

    fn decode(cursor: &mut ByteCursor, event_type: u32, format: HistoryFormat) -> C2eResult<Self> {
        let mut event = HistoryEvent::new(
            event_type,
            cursor.read_u32()?,
            cursor.read_u32()?,
            cursor.read_u32()?,
            cursor.read_u32()?,
        );
        event.moniker1 = read_lpstring(cursor)?;
        event.moniker2 = read_lpstring(cursor)?;
        event.user_text = read_lpstring(cursor)?;
        event.photograph = read_lpstring(cursor)?;
        event.world_name = read_lpstring(cursor)?;
        event.world_uid = read_lpstring(cursor)?;
        if format == HistoryFormat::Ds {
            event.docking = Some(DockingInfo {
                user: read_lpstring(cursor)?,
                unknown1: cursor.read_u32()?,
                unknown2: cursor.read_u32()?,
            });
        }
        Ok(event)
    }

    fn encode(&self, out: &mut Vec<u8>, format: HistoryFormat) {
        write_u32(out, self.event_type);
        write_u32(out, self.world_time);
        write_u32(out, self.creature_age);
        write_u32(out, self.timestamp);
        write_u32(out, self.life_stage);
        write_lpstring(out, &self.moniker1);
        write_lpstring(out, &self.moniker2);
        write_lpstring(out, &self.user_text);
        write_lpstring(out, &self.photograph);
        write_lpstring(out, &self.world_name);
        write_lpstring(out, &self.world_uid);
        if format == HistoryFormat::Ds {
            let docking = self.docking.clone().unwrap_or_default();
            write_lpstring(out, &docking.user);
            write_u32(out, docking.unknown1);
            write_u32(out, docking.unknown2);
        }
    }
}

/// Docking-Station-only trailer of a history: an opaque integer and an
/// opaque tag string. The warp-veteran flag sits between them on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsExtra {
    pub value: u32,
    pub tag: String,
}

/// A creature's full life history, as archived in GLST blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreatureHistory {
    pub moniker: String,
    pub name: String,
    pub gender: u32,
    pub genus: u32,
    pub species: u32,
    events: Vec<HistoryEvent>,
    pub mutations: u32,
    pub crossovers: u32,
    pub warp_veteran: bool,
    pub ds_extra: Option<DsExtra>,
    pub format: HistoryFormat,
}

impl CreatureHistory {
    pub fn new(moniker: impl Into<String>, name: impl Into<String>) -> Self {
        CreatureHistory {
            moniker: moniker.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_event(&mut self, event: HistoryEvent) {
        self.events.push(event);
    }

    pub fn event(&self, index: usize) -> Option<&HistoryEvent> {
        self.events.get(index)
    }

    pub fn remove_event(&mut self, index: usize) -> Option<HistoryEvent> {
        if index < self.events.len() {
            Some(self.events.remove(index))
        } else {
            None
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn events_by_type(&self, event_type: u32) -> Vec<&HistoryEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Generation number from the moniker's leading `N_` prefix; 0 when the
    /// moniker has no parsable prefix.
    pub fn generation_number(&self) -> u32 {
        self.moniker
            .split('_')
            .next()
            .and_then(|prefix| prefix.parse().ok())
            .unwrap_or(0)
    }

    /// Name of the PHOT block holding an event's photo, or None for events
    /// without one.
    pub fn photo_block_name(&self, event: &HistoryEvent) -> Option<String> {
        if event.photograph.is_empty() {
            return None;
        }
        if self.format == HistoryFormat::Ds {
            Some(format!("{}.DSEX.photo", event.photograph))
        } else {
            Some(format!("{}.photo", event.photograph))
        }
    }

    /// DS iff any Docking-Station-only field is populated. Used when no
    /// explicit format is available.
    pub fn guess_format(&self) -> HistoryFormat {
        if self.ds_extra.is_some()
            || self.warp_veteran
            || self.events.iter().any(|e| e.docking.is_some())
        {
            HistoryFormat::Ds
        } else {
            HistoryFormat::C3
        }
    }

    /// Decodes the de-archived GLST payload.
    pub fn decode(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let format = match cursor.read_u8()? {
            MARKER_DS => HistoryFormat::Ds,
            MARKER_C3 => HistoryFormat::C3,
            other => {
                return Err(C2eError::Format(format!(
                    "unrecognised history format marker {other:#04x}"
                )))
            }
        };
        cursor.skip(3)?; // reserved, always zero
        let sentinel = cursor.read_u32()?;
        if sentinel != 1 {
            return Err(C2eError::Format(format!(
                "history sentinel is {sentinel}, expected 1"
            )));
        }

        let moniker = read_lpstring(&mut cursor)?;
        // the moniker is stored twice; the duplicate carries no information
        read_lpstring(&mut cursor)?;
        let name = read_lpstring(&mut cursor)?;

        let mut history = CreatureHistory::new(moniker, name);
        history.format = format;
        history.gender = cursor.read_u32()?;
        history.genus = cursor.read_u32()?;
        history.species = cursor.read_u32()?;

        let event_count = cursor.read_u32()?;
        for index in 0..event_count {
            let event_type = cursor.read_u32()?;
            if event_type >= EVENT_TYPE_LIMIT {
                warn!(
                    event_type,
                    index, "unknown event type; treating event list as terminated"
                );
                break;
            }
            history
                .events
                .push(HistoryEvent::decode(&mut cursor, event_type, format)?);
        }

        // footer: best-effort, since an early event-list stop leaves the
        // cursor on untrustworthy bytes
        history.mutations = cursor.try_read_u32().unwrap_or(0);
        history.crossovers = cursor.try_read_u32().unwrap_or(0);
        if format == HistoryFormat::Ds {
            if let Some(value) = cursor.try_read_u32() {
                history.warp_veteran = cursor.try_read_u32() == Some(1);
                let tag = try_read_lpstring(&mut cursor).unwrap_or_default();
                history.ds_extra = Some(DsExtra { value, tag });
            }
        }
        Ok(history)
    }

    /// Encodes the history, ready for archiving into a GLST block. With
    /// `HistoryFormat::Unknown` the format is guessed from the populated
    /// fields.
    pub fn encode(&self, format: HistoryFormat) -> Vec<u8> {
        let format = match format {
            HistoryFormat::Unknown => match self.format {
                HistoryFormat::Unknown => self.guess_format(),
                explicit => explicit,
            },
            explicit => explicit,
        };
        let mut out = Vec::new();
        let marker = if format == HistoryFormat::Ds {
            MARKER_DS
        } else {
            MARKER_C3
        };
        write_u32(&mut out, marker as u32);
        write_u32(&mut out, 1);
        write_lpstring(&mut out, &self.moniker);
        write_lpstring(&mut out, &self.moniker); // duplicate, by design
        write_lpstring(&mut out, &self.name);
        write_u32(&mut out, self.gender);
        write_u32(&mut out, self.genus);
        write_u32(&mut out, self.species);
        write_u32(&mut out, self.events.len() as u32);
        for event in &self.events {
            event.encode(&mut out, format);
        }
        write_u32(&mut out, self.mutations);
        write_u32(&mut out, self.crossovers);
        if format == HistoryFormat::Ds {
            let extra = self.ds_extra.clone().unwrap_or_default();
            write_u32(&mut out, extra.value);
            write_u32(&mut out, self.warp_veteran as u32);
            write_lpstring(&mut out, &extra.tag);
        }
        out
    }
}

fn read_lpstring(cursor: &mut ByteCursor) -> C2eResult<String> {
    let length = cursor.read_u32()? as usize;
    Ok(decode_text(cursor.read(length)?))
}

fn try_read_lpstring(cursor: &mut ByteCursor) -> Option<String> {
    let length = cursor.try_read_u32()? as usize;
    Some(decode_text(cursor.try_read(length)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(event_type: u32) -> HistoryEvent {
        let mut event = HistoryEvent::new(event_type, 1000, 50, 1_200_000_000, 2);
        event.moniker1 = "001-aaaa-bbbbb-cccc".into();
        event.user_text = "hello".into();
        event.photograph = "001-aaaa-bbbbb-cccc-000001".into();
        event.world_name = "Albia".into();
        event.world_uid = "world-uid-1".into();
        event
    }

    fn sample_history() -> CreatureHistory {
        let mut history = CreatureHistory::new("2_001-aaaa-bbbbb-cccc", "Moe");
        history.gender = GENDER_MALE;
        history.genus = GENUS_NORN;
        history.species = 1;
        history.mutations = 3;
        history.crossovers = 7;
        history.add_event(sample_event(EVENT_CONCEIVED));
        history.add_event(sample_event(EVENT_HATCHED));
        history
    }

    #[test]
    fn c3_round_trips_without_ds_fields() {
        let history = sample_history();
        let bytes = history.encode(HistoryFormat::C3);
        assert_eq!(bytes[0], 0x0C);
        let reread = CreatureHistory::decode(&bytes).unwrap();
        assert_eq!(reread.format, HistoryFormat::C3);
        assert_eq!(reread.moniker, history.moniker);
        assert_eq!(reread.name, "Moe");
        assert_eq!(reread.event_count(), 2);
        assert_eq!(reread.events()[1].event_type, EVENT_HATCHED);
        assert!(reread.events()[0].docking.is_none());
        assert_eq!(reread.mutations, 3);
        assert_eq!(reread.crossovers, 7);
        assert!(reread.ds_extra.is_none());
    }

    #[test]
    fn ds_round_trips_trailing_fields() {
        let mut history = sample_history();
        for event in &mut history.events {
            event.docking = Some(DockingInfo {
                user: "ds-user".into(),
                unknown1: 4,
                unknown2: 5,
            });
        }
        history.warp_veteran = true;
        history.ds_extra = Some(DsExtra {
            value: 9,
            tag: "tag".into(),
        });

        let bytes = history.encode(HistoryFormat::Unknown); // guessed as DS
        assert_eq!(bytes[0], 0x27);
        let reread = CreatureHistory::decode(&bytes).unwrap();
        assert_eq!(reread.format, HistoryFormat::Ds);
        assert!(reread.warp_veteran);
        assert_eq!(reread.ds_extra, history.ds_extra);
        assert_eq!(
            reread.events()[0].docking.as_ref().unwrap().user,
            "ds-user"
        );
    }

    #[test]
    fn bad_marker_and_sentinel_are_format_errors() {
        let mut bytes = sample_history().encode(HistoryFormat::C3);
        bytes[0] = 0x42;
        assert!(matches!(
            CreatureHistory::decode(&bytes),
            Err(C2eError::Format(_))
        ));

        let mut bytes = sample_history().encode(HistoryFormat::C3);
        bytes[4] = 2; // sentinel
        assert!(matches!(
            CreatureHistory::decode(&bytes),
            Err(C2eError::Format(_))
        ));
    }

    #[test]
    fn unknown_event_type_halts_decoding_without_error() {
        let mut history = sample_history();
        history.events[1].event_type = 18;
        let bytes = history.encode(HistoryFormat::C3);
        let reread = CreatureHistory::decode(&bytes).unwrap();
        assert_eq!(reread.event_count(), 1);
        assert_eq!(reread.events()[0].event_type, EVENT_CONCEIVED);
    }

    #[test]
    fn duplicate_moniker_is_discarded_on_decode() {
        let history = sample_history();
        let mut bytes = history.encode(HistoryFormat::C3);
        // corrupt the second moniker copy in place; decode must not care
        let moniker_len = history.moniker.len();
        let second_copy = 8 + 4 + moniker_len + 4;
        bytes[second_copy] = b'X';
        let reread = CreatureHistory::decode(&bytes).unwrap();
        assert_eq!(reread.moniker, history.moniker);
    }

    #[test]
    fn generation_number_parses_moniker_prefix() {
        assert_eq!(sample_history().generation_number(), 2);
        assert_eq!(CreatureHistory::new("junk", "x").generation_number(), 0);
    }

    #[test]
    fn photo_block_names_differ_by_format() {
        let mut history = sample_history();
        let event = history.events()[0].clone();
        history.format = HistoryFormat::C3;
        assert_eq!(
            history.photo_block_name(&event).unwrap(),
            "001-aaaa-bbbbb-cccc-000001.photo"
        );
        history.format = HistoryFormat::Ds;
        assert_eq!(
            history.photo_block_name(&event).unwrap(),
            "001-aaaa-bbbbb-cccc-000001.DSEX.photo"
        );
        let mut no_photo = event;
        no_photo.photograph.clear();
        assert!(history.photo_block_name(&no_photo).is_none());
    }

    #[test]
    fn events_are_removable_by_position() {
        let mut history = sample_history();
        let removed = history.remove_event(0).unwrap();
        assert_eq!(removed.event_type, EVENT_CONCEIVED);
        assert_eq!(history.event_count(), 1);
        assert!(history.remove_event(5).is_none());
    }
}
