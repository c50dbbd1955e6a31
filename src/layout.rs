//! Byte- and bit-level layout. An [`AggBuilder`] wraps an aggregate
//! while it is being populated: members enter as *pending*, options
//! may still mutate them, and layout settles a member only when its
//! successor opens or the aggregate closes. Offsets therefore always
//! derive from a fully optioned predecessor.

use crate::error::SdlError;
use crate::model::aggregate::{
    Aggregate, AggregateKind, Field, Member,
};
use crate::model::scalar::ScalarKind;
use crate::model::{Alignment, TypeRef};
use crate::{AlignMode, Target};

/// State of the bitfield run currently being packed.
#[derive(Debug, Clone, Copy)]
struct BitRun {
    /// Index of the first run member among the settled members.
    start: usize,
    byte_offset: u64,
    next_bit: u32,
    host_bytes: u32,
    /// Host width was spelled in the source; promotion is off.
    fixed: bool,
}

#[derive(Debug)]
pub(crate) struct AggBuilder {
    pub agg: Aggregate,
    /// Appended but not yet laid out; late options still apply here.
    pub pending: Option<Member>,
    run: Option<BitRun>,
    fill_count: u32,
}

impl AggBuilder {
    pub fn new(agg: Aggregate) -> Self {
        Self {
            agg,
            pending: None,
            run: None,
            fill_count: 0,
        }
    }

    /// Settle whatever is pending, then stage the new member.
    pub fn push(
        &mut self,
        target: &Target,
        member: Member,
    ) -> Result<(), SdlError> {
        let result = self.settle_pending(target);
        self.pending = Some(member);
        result
    }

    pub fn settle_pending(
        &mut self,
        target: &Target,
    ) -> Result<(), SdlError> {
        let Some(member) = self.pending.take() else {
            return Ok(());
        };
        match member {
            Member::Comment(c) => {
                self.agg.members.push(Member::Comment(c));
                Ok(())
            }
            Member::Field(f) if f.is_bitfield() => self.settle_bitfield(f),
            Member::Field(mut f) => {
                self.seal_run();
                let natural = natural_of_field(&f);
                f.offset = self.place(target, natural, f.alignment);
                self.push_settled(Member::Field(f));
                Ok(())
            }
            Member::Aggregate(mut sub) => {
                self.seal_run();
                let natural = natural_of_aggregate(&sub);
                sub.offset = self.place(target, natural, sub.alignment);
                self.push_settled(Member::Aggregate(sub));
                Ok(())
            }
        }
    }

    fn push_settled(&mut self, member: Member) {
        if self.agg.origin_member.is_none() {
            if let (Some(origin), Some(name)) =
                (self.agg.origin_name.as_deref(), member.name())
            {
                if origin == name {
                    self.agg.origin_member = Some(self.agg.members.len());
                }
            }
        }
        self.agg.members.push(member);
    }

    /// Byte offset for the next non-bitfield member.
    fn place(
        &mut self,
        target: &Target,
        natural: u64,
        request: Option<Alignment>,
    ) -> u64 {
        if self.agg.kind.is_union() {
            return 0;
        }
        let offset = self.running_offset();
        align_up(offset, effective_alignment(target, natural, request))
    }

    fn running_offset(&self) -> u64 {
        self.agg
            .members
            .iter()
            .rev()
            .find(|m| !m.is_comment())
            .map(|m| m.offset() + m.real_size())
            .unwrap_or(0)
    }

    fn settle_bitfield(&mut self, f: Field) -> Result<(), SdlError> {
        let len = f.bit_length.unwrap_or(0);
        if len == 0 {
            // drop the member, keep the run as it was
            return Err(SdlError::ZeroLength { name: f.id.clone() });
        }
        if self.agg.kind.is_union() {
            return self.settle_union_bitfield(f, len);
        }

        if let Some(run) = self.run {
            let full = run.host_bytes * 8;
            let fits = run.next_bit + len <= full;
            let same_host = !f.explicit_host || f.size == run.host_bytes;
            if fits && same_host && run.next_bit < full {
                return self.extend_run(f, len);
            }
            if !fits
                && run.next_bit < full
                && !f.explicit_host
                && !run.fixed
            {
                // adaptive promotion: the whole run of unsized fields
                // widens to the smallest host that also holds the
                // newcomer, bit offsets preserved; a sum no host can
                // hold falls through to a fresh run instead
                let total = run.next_bit + len;
                if let Ok(host) = smallest_host(total) {
                    self.promote_run(host);
                    return self.extend_run(f, len);
                }
            }
            self.seal_run();
            return self.start_run(f, len);
        }
        self.start_run(f, len)
    }

    fn settle_union_bitfield(
        &mut self,
        mut f: Field,
        len: u32,
    ) -> Result<(), SdlError> {
        // union members overlap; every bitfield is its own run
        let host = if f.explicit_host {
            f.size
        } else {
            smallest_host(len)?
        };
        if len > host * 8 {
            return Err(SdlError::BitfieldTooWide {
                name: f.id.clone(),
                bits: len,
            });
        }
        f.size = host;
        f.offset = 0;
        f.bit_offset = Some(0);
        self.run = Some(BitRun {
            start: self.agg.members.len(),
            byte_offset: 0,
            next_bit: len,
            host_bytes: host,
            fixed: f.explicit_host,
        });
        self.push_settled(Member::Field(f));
        Ok(())
    }

    fn start_run(&mut self, mut f: Field, len: u32) -> Result<(), SdlError> {
        let host = if f.explicit_host {
            f.size
        } else {
            smallest_host(len)?
        };
        if len > host * 8 {
            return Err(SdlError::BitfieldTooWide {
                name: f.id.clone(),
                bits: len,
            });
        }
        f.size = host;
        let offset = {
            let next = self.running_offset();
            align_up(next, host as u64)
        };
        f.offset = offset;
        f.bit_offset = Some(0);
        self.run = Some(BitRun {
            start: self.agg.members.len(),
            byte_offset: offset,
            next_bit: len,
            host_bytes: host,
            fixed: f.explicit_host,
        });
        self.push_settled(Member::Field(f));
        Ok(())
    }

    fn extend_run(&mut self, mut f: Field, len: u32) -> Result<(), SdlError> {
        let run = self.run.as_mut().expect("extend without a run");
        f.size = run.host_bytes;
        f.offset = run.byte_offset;
        f.bit_offset = Some(run.next_bit);
        run.next_bit += len;
        // an explicitly sized member pins the run width
        run.fixed |= f.explicit_host;
        self.push_settled(Member::Field(f));
        Ok(())
    }

    fn promote_run(&mut self, host: u32) {
        let Some(run) = self.run.as_mut() else { return };
        run.host_bytes = host;
        for member in &mut self.agg.members[run.start..] {
            if let Member::Field(f) = member {
                f.size = host;
            }
        }
    }

    /// Close the open run. In structures, unused tail bits become a
    /// synthesised filler member.
    fn seal_run(&mut self) {
        let Some(run) = self.run.take() else { return };
        if self.agg.kind.is_union() {
            return;
        }
        let full = run.host_bytes * 8;
        if run.next_bit < full {
            let filler = self.make_filler(
                run.byte_offset,
                run.next_bit,
                full - run.next_bit,
                run.host_bytes,
            );
            self.agg.members.push(Member::Field(filler));
        }
    }

    fn make_filler(
        &mut self,
        offset: u64,
        bit_offset: u32,
        bit_length: u32,
        host_bytes: u32,
    ) -> Field {
        self.fill_count += 1;
        Field {
            id: format!("filler_{:03}", self.fill_count),
            prefix: None,
            tag: ScalarKind::Bitfield.default_tag().to_lowercase(),
            type_ref: TypeRef::Scalar(ScalarKind::Bitfield),
            signed: false,
            size: host_bytes,
            alignment: None,
            dimension: None,
            length: None,
            precision: None,
            subtype: None,
            offset,
            bit_length: Some(bit_length),
            bit_offset: Some(bit_offset),
            mask: false,
            explicit_host: false,
            filler: true,
        }
    }

    /// Settle the tail, size the aggregate, and run the union floor
    /// rules. The aggregate is complete afterwards even when an error
    /// is returned.
    pub fn close(&mut self, target: &Target) -> Result<(), SdlError> {
        let mut first_error = self.settle_pending(target).err();

        match self.agg.kind {
            AggregateKind::Structure => {
                self.seal_run();
                let size = self.running_offset();
                self.agg.size = self.round_size(target, size);
            }
            AggregateKind::Union => {
                self.run = None;
                let size = self.union_max();
                self.agg.size = self.round_size(target, size);
            }
            AggregateKind::ImplicitUnion(scalar) => {
                let floor =
                    scalar.size_bytes(target.pointer_bytes) as u64;
                let max = self.union_max();
                if floor > max {
                    let used = match self.run.take() {
                        Some(run) => run.next_bit,
                        None => (max * 8) as u32,
                    };
                    let filler = self.make_filler(
                        0,
                        used,
                        (floor * 8) as u32 - used,
                        floor as u32,
                    );
                    self.agg.members.push(Member::Field(filler));
                    self.agg.size = floor;
                } else {
                    self.run = None;
                    self.agg.size = self.round_size(target, max);
                }
            }
        }

        if self.agg.first_layout_member().is_none()
            && first_error.is_none()
        {
            first_error = Some(SdlError::NullStructure {
                name: self.agg.id.clone(),
            });
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn union_max(&self) -> u64 {
        self.agg
            .members
            .iter()
            .map(Member::real_size)
            .max()
            .unwrap_or(0)
    }

    fn round_size(&self, target: &Target, size: u64) -> u64 {
        let natural = natural_of_aggregate(&self.agg);
        let align =
            effective_alignment(target, natural, self.agg.alignment);
        align_up(size, align)
    }

    pub fn finish(self) -> Aggregate {
        self.agg
    }
}

pub(crate) fn align_up(offset: u64, align: u64) -> u64 {
    if align <= 1 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// Fold the per-member request with the target default.
pub(crate) fn effective_alignment(
    target: &Target,
    natural: u64,
    request: Option<Alignment>,
) -> u64 {
    match request {
        Some(Alignment::NoAlign) => 1,
        Some(Alignment::Natural) => natural.max(1),
        Some(Alignment::Explicit(n)) => (n as u64).max(1),
        None => match target.align {
            AlignMode::Packed => 1,
            AlignMode::Natural => natural.max(1),
            AlignMode::Limit(n) => natural.min(n as u64).max(1),
        },
    }
}

/// Smallest host of {8,16,32,64,128} bits that holds `bits`.
fn smallest_host(bits: u32) -> Result<u32, SdlError> {
    for bytes in [1u32, 2, 4, 8, 16] {
        if bits <= bytes * 8 {
            return Ok(bytes);
        }
    }
    Err(SdlError::BitfieldTooWide {
        name: String::new(),
        bits,
    })
}

fn natural_of_field(f: &Field) -> u64 {
    prev_power_of_two(f.size as u64)
}

/// Natural alignment of an aggregate: its declared explicit alignment
/// or the natural alignment of its first non-comment member.
fn natural_of_aggregate(agg: &Aggregate) -> u64 {
    if let Some(Alignment::Explicit(n)) = agg.alignment {
        return (n as u64).max(1);
    }
    match agg.first_layout_member() {
        Some(Member::Field(f)) => natural_of_field(f),
        Some(Member::Aggregate(sub)) => natural_of_aggregate(sub),
        _ => 1,
    }
}

fn prev_power_of_two(n: u64) -> u64 {
    if n == 0 {
        return 1;
    }
    (1u64 << (63 - n.leading_zeros())).min(16)
}
