//! Skyline rectangle packer
//!
//! Bottom-left skyline bin packing. The skyline is a singly linked list of
//! `(x, y)` breakpoints kept in an index arena: the first two arena slots are
//! the initial full-width node and the right-edge sentinel, the rest form the
//! free list. Widths are quantized so the node storage can never run out.

use std::cmp::Reverse;
use std::collections::TryReserveError;

/// Height of the right-edge sentinel, above any rect that can fit
const SENTINEL_HEIGHT: u32 = 1 << 30;

/// Arena slot of the node spanning the bin on reset
const INITIAL: usize = 0;

/// Arena slot of the sentinel at `x = extent.x`
const SENTINEL: usize = 1;

/// Input/output record for [`RectPacker::pack_rects`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackRect {
    /// Caller-defined identifier, preserved through sorting
    pub id: u32,
    /// Width and height to place (padding already applied)
    pub extent: [u32; 2],
    /// Top-left position in the bin, valid when `packed`
    pub pos: [u32; 2],
    /// Whether the rect was placed in the current bin
    pub packed: bool,
}

impl PackRect {
    pub fn new(id: u32, extent: [u32; 2]) -> Self {
        Self {
            id,
            extent,
            pos: [0, 0],
            packed: false,
        }
    }

    /// Whether `self` and `other` overlap when both are packed
    pub fn overlaps(&self, other: &PackRect) -> bool {
        let [ax, ay] = self.pos;
        let [bx, by] = other.pos;
        let [aw, ah] = self.extent;
        let [bw, bh] = other.extent;
        ax < bx + bw && bx < ax + aw && ay < by + bh && by < ay + ah
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    x: u32,
    y: u32,
    next: Option<usize>,
}

/// The link that points at a skyline node: the list head or a node's `next`
#[derive(Debug, Clone, Copy)]
enum Link {
    Head,
    After(usize),
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    link: Link,
    x: u32,
    y: u32,
    waste: u64,
}

/// Skyline bottom-left bin packer for one bin at a time
#[derive(Debug)]
pub struct RectPacker {
    extent: [u32; 2],
    /// Width quantum, `ceil(extent.x / num_nodes)`
    align: u32,
    num_nodes: usize,
    nodes: Vec<Node>,
    active_head: usize,
    free_head: Option<usize>,
    wasted_area: u64,
}

impl RectPacker {
    /// Create a packer for a bin of `extent` using `num_nodes` skyline nodes.
    ///
    /// Passing `num_nodes >= extent[0]` gives unquantized widths.
    pub fn new(extent: [u32; 2], num_nodes: usize) -> Result<Self, TryReserveError> {
        let num_nodes = num_nodes.max(1);
        let mut nodes = Vec::new();
        nodes.try_reserve_exact(num_nodes + 2)?;

        let mut packer = Self {
            extent,
            align: 1,
            num_nodes,
            nodes,
            active_head: INITIAL,
            free_head: None,
            wasted_area: 0,
        };
        packer.reset();
        Ok(packer)
    }

    /// Start packing into a fresh, empty bin of the same extent
    pub fn reset(&mut self) {
        let num_nodes = self.num_nodes;

        self.nodes.clear();
        self.nodes.push(Node {
            x: 0,
            y: 0,
            next: Some(SENTINEL),
        });
        self.nodes.push(Node {
            x: self.extent[0],
            y: SENTINEL_HEIGHT,
            next: None,
        });
        self.nodes.extend((0..num_nodes).map(|i| Node {
            x: 0,
            y: 0,
            next: (i + 1 < num_nodes).then_some(SENTINEL + 2 + i),
        }));

        self.active_head = INITIAL;
        self.free_head = Some(SENTINEL + 1);
        self.align = self.extent[0].div_ceil(num_nodes as u32).max(1);
        self.wasted_area = 0;
    }

    pub fn extent(&self) -> [u32; 2] {
        self.extent
    }

    /// Area left unusable beneath placed rects since the last reset
    pub fn wasted_area(&self) -> u64 {
        self.wasted_area
    }

    /// Pack a batch into the current bin.
    ///
    /// The batch is sorted by descending height, then descending width, before
    /// placement. Zero-area rects are placed at the origin. Returns `true` if
    /// every rect was packed; rects that do not fit have `packed == false`.
    pub fn pack_rects(&mut self, rects: &mut [PackRect]) -> bool {
        rects.sort_by_key(|r| (Reverse(r.extent[1]), Reverse(r.extent[0])));

        let mut all_packed = true;
        for rect in rects.iter_mut() {
            if rect.extent[0] == 0 || rect.extent[1] == 0 {
                rect.pos = [0, 0];
                rect.packed = true;
                continue;
            }

            match self.pack_rect(rect.extent) {
                Some(pos) => {
                    rect.pos = pos;
                    rect.packed = true;
                }
                None => {
                    rect.pos = [0, 0];
                    rect.packed = false;
                    all_packed = false;
                }
            }
        }

        all_packed
    }

    fn pack_rect(&mut self, extent: [u32; 2]) -> Option<[u32; 2]> {
        let placement = self.find_best_pos(extent)?;

        if placement.y + extent[1] > self.extent[1] {
            return None;
        }

        let node = self.free_head?;
        self.free_head = self.nodes[node].next;
        self.nodes[node].x = placement.x;
        self.nodes[node].y = placement.y + extent[1];

        let mut cur = self.target(placement.link);
        self.set_link(placement.link, node);

        // Release the nodes now covered by the rect
        let right = placement.x + extent[0];
        while let Some(next) = self.nodes[cur].next {
            if self.nodes[next].x > right {
                break;
            }
            self.nodes[cur].next = self.free_head;
            self.free_head = Some(cur);
            cur = next;
        }

        self.nodes[node].next = Some(cur);
        if self.nodes[cur].x < right {
            self.nodes[cur].x = right;
        }

        self.wasted_area += placement.waste;
        Some([placement.x, placement.y])
    }

    fn find_best_pos(&self, extent: [u32; 2]) -> Option<Placement> {
        let width = extent[0].div_ceil(self.align) * self.align;

        if width > self.extent[0] || extent[1] > self.extent[1] {
            return None;
        }

        let mut best: Option<Placement> = None;
        let mut prev = Link::Head;
        let mut node = self.active_head;

        while self.nodes[node].x + width <= self.extent[0] {
            let x = self.nodes[node].x;
            let (y, waste) = self.find_min_y(node, x, width);

            // First lowest position wins
            if best.map_or(true, |b| y < b.y) {
                best = Some(Placement {
                    link: prev,
                    x,
                    y,
                    waste,
                });
            }

            prev = Link::After(node);
            match self.nodes[node].next {
                Some(next) => node = next,
                None => break,
            }
        }

        best
    }

    /// Lowest y at which a rect spanning `[x0, x0 + width)` clears the skyline,
    /// and the area wasted underneath it
    fn find_min_y(&self, first: usize, x0: u32, width: u32) -> (u32, u64) {
        let x1 = x0 + width;
        let mut node = first;
        let mut min_y = 0u32;
        let mut waste = 0u64;
        let mut visited = 0u32;

        while self.nodes[node].x < x1 {
            let Node { x, y, next } = self.nodes[node];
            let Some(next) = next else {
                break;
            };
            let next_x = self.nodes[next].x;

            if y > min_y {
                waste += visited as u64 * (y - min_y) as u64;
                min_y = y;
                visited += next_x - x.max(x0);
            } else {
                let under = (next_x - x).min(width - visited);
                waste += under as u64 * (min_y - y) as u64;
                visited += under;
            }

            node = next;
        }

        (min_y, waste)
    }

    fn target(&self, link: Link) -> usize {
        match link {
            Link::Head => self.active_head,
            Link::After(node) => self.nodes[node].next.unwrap_or(SENTINEL),
        }
    }

    fn set_link(&mut self, link: Link, node: usize) {
        match link {
            Link::Head => self.active_head = node,
            Link::After(prev) => self.nodes[prev].next = Some(node),
        }
    }
}
